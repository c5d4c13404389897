use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::collaborators::{ConversationSource, FetchError};
use crate::models::Conversation;

/// In-memory conversation store. Clones the current list on every fetch.
#[derive(Default)]
pub struct MemoryConversationSource {
    conversations: Mutex<Vec<Conversation>>,
    failure: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl MemoryConversationSource {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations: Mutex::new(conversations),
            ..Default::default()
        }
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        *self.conversations.lock() = conversations;
    }

    /// Make every subsequent fetch fail with `reason` until `recover` is called.
    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Number of fetches attempted so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationSource for MemoryConversationSource {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failure.lock().clone() {
            return Err(FetchError::Unavailable(reason));
        }
        Ok(self.conversations.lock().clone())
    }
}
