use serde::{Deserialize, Serialize};

/// Event delivered by the push channel for the current session.
///
/// Wire format is a JSON object tagged by `type`, e.g.
/// `{"type":"messages-read","count":2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PushEvent {
    /// A message was delivered to `recipient_id`
    #[serde(rename_all = "camelCase")]
    NewMessage { recipient_id: String },
    /// Messages were marked read; `count` is absent when the sender did not report it
    MessagesRead {
        #[serde(default)]
        count: Option<u32>,
    },
    /// The current user sent a message
    MessageSent {},
}

impl PushEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::NewMessage { .. } => "new-message",
            PushEvent::MessagesRead { .. } => "messages-read",
            PushEvent::MessageSent {} => "message-sent",
        }
    }

    /// Parse a single JSON line. Returns `None` for blank or malformed input.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!("Failed to parse push event: {} - line: {}", e, line);
                None
            }
        }
    }
}

/// Signal emitted by the override store whenever its contents change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideChange {
    ConversationFlagged(String),
    ConversationCleared(String),
    MessageFlagged {
        conversation_id: String,
        message_id: String,
    },
    MessageCleared {
        conversation_id: String,
        message_id: String,
    },
    /// Everything was replaced or wiped
    Reset,
}
