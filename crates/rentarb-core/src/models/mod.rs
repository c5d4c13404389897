pub mod badge;
pub mod conversation;
pub mod overrides;

pub use badge::{BadgeState, SessionPhase};
pub use conversation::{total_unread, Conversation, MessageSummary};
pub use overrides::ManualOverrideSet;
