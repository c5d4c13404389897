use serde::{Deserialize, Serialize};

/// Summary of the newest message in a conversation, as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    /// Unix seconds
    #[serde(default)]
    pub created_at: u64,
}

/// One support conversation with its authoritative unread count.
/// Identity is `participant_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub participant_id: String,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessageSummary>,
}

impl Conversation {
    pub fn new(participant_id: impl Into<String>, unread_count: u32) -> Self {
        Self {
            participant_id: participant_id.into(),
            unread_count,
            last_message: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.participant_id
    }
}

/// Sum of the authoritative unread counts of a snapshot.
pub fn total_unread(conversations: &[Conversation]) -> u32 {
    conversations
        .iter()
        .fold(0u32, |acc, c| acc.saturating_add(c.unread_count))
}
