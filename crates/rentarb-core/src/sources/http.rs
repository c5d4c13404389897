use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{ConversationSource, FetchError};
use crate::constants::CONVERSATIONS_PATH;
use crate::models::Conversation;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches `GET <endpoint>/conversations`, expecting a JSON array of conversations.
pub struct HttpConversationSource {
    client: reqwest::Client,
    url: String,
}

impl HttpConversationSource {
    pub fn new(endpoint: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            url: conversations_url(endpoint),
        }
    }
}

fn conversations_url(endpoint: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), CONVERSATIONS_PATH)
}

#[async_trait]
impl ConversationSource for HttpConversationSource {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?;

        let conversations = response.json::<Vec<Conversation>>().await?;
        tracing::debug!(url = %self.url, count = conversations.len(), "fetched conversations");
        Ok(conversations)
    }
}
