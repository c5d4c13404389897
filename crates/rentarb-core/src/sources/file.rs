use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::collaborators::{ConversationSource, FetchError};
use crate::models::Conversation;

/// Reads a JSON array of conversations from disk on every fetch.
/// Handy for driving the badge from a hand-edited snapshot.
pub struct FileConversationSource {
    path: PathBuf,
}

impl FileConversationSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ConversationSource for FileConversationSource {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, FetchError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
