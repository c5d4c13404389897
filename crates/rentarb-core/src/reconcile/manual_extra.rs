//! Override calculator.
//!
//! Manual flags only add the part the server does not already count: a conversation
//! the server reports with 3 unread and 2 flagged messages contributes nothing.
//! Flags on conversations missing from the snapshot still count until the override
//! store clears them.

use crate::models::{Conversation, ManualOverrideSet};

/// Unread units to add on top of the authoritative total because of manual flags.
pub fn manual_extra(conversations: &[Conversation], overrides: &ManualOverrideSet) -> u32 {
    let mut extra: u32 = 0;
    let mut conversation_flags = overrides.conversation_flags.clone();
    let mut message_flags = overrides.message_flags.clone();

    for conversation in conversations {
        let id = conversation.id();
        let actual = conversation.unread_count;

        let flagged = u32::from(conversation_flags.remove(id));
        let flagged_messages = message_flags
            .remove(id)
            .map(|m| count_u32(m.len()))
            .unwrap_or(0);
        let manual_count = flagged.max(flagged_messages);

        if manual_count > actual {
            extra = extra.saturating_add(manual_count - actual);
        }
    }

    // Flagged conversations not in the snapshot (e.g. not loaded yet)
    for id in &conversation_flags {
        let flagged_messages = message_flags
            .remove(id)
            .map(|m| count_u32(m.len()))
            .unwrap_or(0);
        extra = extra.saturating_add(flagged_messages.max(1));
    }

    // Message flags with neither a conversation flag nor a conversation
    for messages in message_flags.values() {
        extra = extra.saturating_add(count_u32(messages.len()));
    }

    extra
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
