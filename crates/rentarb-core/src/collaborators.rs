//! Contracts of the three external collaborators feeding the badge engine.

use async_trait::async_trait;

use crate::bus::Subscription;
use crate::events::{OverrideChange, PushEvent};
use crate::models::{Conversation, ManualOverrideSet};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode conversations: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Conversation store unavailable: {0}")]
    Unavailable(String),
}

/// Remote store returning every conversation of the current user.
/// Idempotent and side-effect free; safe to retry.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, FetchError>;
}

/// Real-time event stream for the current session (at-least-once delivery).
pub trait PushChannel: Send + Sync {
    fn on_push_event(&self, handler: Box<dyn Fn(&PushEvent) + Send + Sync>) -> Subscription;
}

/// Persisted manual flags. Read synchronously; changes are announced asynchronously.
pub trait OverrideSource: Send + Sync {
    fn read_overrides(&self) -> ManualOverrideSet;

    fn subscribe_override_changes(
        &self,
        handler: Box<dyn Fn(&OverrideChange) + Send + Sync>,
    ) -> Subscription;
}
