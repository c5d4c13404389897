use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Manually set "still needs follow-up" flags that force items to count as unread.
///
/// Conversation flags mark a whole conversation; message flags mark individual
/// messages inside a conversation. Both are keyed by conversation id (`participant_id`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualOverrideSet {
    pub conversation_flags: HashSet<String>,
    pub message_flags: HashMap<String, HashSet<String>>,
}

impl ManualOverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode persisted override data. Each collection is decoded on its own, so a
    /// malformed one reads as empty without discarding the other.
    pub fn from_json_lenient(bytes: &[u8]) -> Self {
        let mut object = match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(serde_json::Value::Object(object)) => object,
            Ok(other) => {
                tracing::warn!("Discarding manual override data: expected an object, got {}", other);
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Discarding malformed manual override data: {}", e);
                return Self::default();
            }
        };

        let mut set = Self {
            conversation_flags: decode_collection(&mut object, "conversationFlags"),
            message_flags: decode_collection(&mut object, "messageFlags"),
        };
        set.prune_empty();
        set
    }

    pub fn is_empty(&self) -> bool {
        self.conversation_flags.is_empty() && self.message_flags.values().all(|m| m.is_empty())
    }

    pub fn is_conversation_flagged(&self, conversation_id: &str) -> bool {
        self.conversation_flags.contains(conversation_id)
    }

    pub fn flagged_message_count(&self, conversation_id: &str) -> usize {
        self.message_flags
            .get(conversation_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Returns true if the flag was newly added.
    pub fn flag_conversation(&mut self, conversation_id: &str) -> bool {
        self.conversation_flags.insert(conversation_id.to_string())
    }

    /// Removes the conversation flag and every message flag under it.
    /// Returns true if anything was removed.
    pub fn clear_conversation(&mut self, conversation_id: &str) -> bool {
        let had_flag = self.conversation_flags.remove(conversation_id);
        let had_messages = self
            .message_flags
            .remove(conversation_id)
            .map(|m| !m.is_empty())
            .unwrap_or(false);
        had_flag || had_messages
    }

    pub fn flag_message(&mut self, conversation_id: &str, message_id: &str) -> bool {
        self.message_flags
            .entry(conversation_id.to_string())
            .or_default()
            .insert(message_id.to_string())
    }

    pub fn clear_message(&mut self, conversation_id: &str, message_id: &str) -> bool {
        let Some(messages) = self.message_flags.get_mut(conversation_id) else {
            return false;
        };
        let removed = messages.remove(message_id);
        if messages.is_empty() {
            self.message_flags.remove(conversation_id);
        }
        removed
    }

    fn prune_empty(&mut self) {
        self.message_flags.retain(|_, messages| !messages.is_empty());
    }
}

fn decode_collection<T>(object: &mut serde_json::Map<String, serde_json::Value>, key: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    let Some(value) = object.remove(key) else {
        return T::default();
    };
    match serde_json::from_value(value) {
        Ok(collection) => collection,
        Err(e) => {
            tracing::warn!("Discarding malformed {} in manual override data: {}", key, e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_decode() {
        let json = br#"{"conversationFlags": ["A"], "messageFlags": {"B": ["m1", "m2"], "C": []}}"#;
        let set = ManualOverrideSet::from_json_lenient(json);

        assert!(set.is_conversation_flagged("A"));
        assert_eq!(set.flagged_message_count("B"), 2);
        // Empty message lists are dropped on load
        assert!(!set.message_flags.contains_key("C"));
    }

    #[test]
    fn test_malformed_data_reads_as_empty() {
        assert!(ManualOverrideSet::from_json_lenient(b"{garbage").is_empty());
        assert!(ManualOverrideSet::from_json_lenient(br#"{"conversationFlags": 7}"#).is_empty());
        assert!(ManualOverrideSet::from_json_lenient(b"").is_empty());
        assert!(ManualOverrideSet::from_json_lenient(b"[1, 2]").is_empty());
    }

    #[test]
    fn test_malformed_collection_keeps_the_other() {
        let set = ManualOverrideSet::from_json_lenient(
            br#"{"conversationFlags": ["A"], "messageFlags": {"B": "oops"}}"#,
        );
        assert!(set.is_conversation_flagged("A"));
        assert!(set.message_flags.is_empty());

        let set = ManualOverrideSet::from_json_lenient(
            br#"{"conversationFlags": {"A": true}, "messageFlags": {"B": ["m1"]}}"#,
        );
        assert!(set.conversation_flags.is_empty());
        assert_eq!(set.flagged_message_count("B"), 1);
    }

    #[test]
    fn test_partial_data_keeps_present_collection() {
        let set = ManualOverrideSet::from_json_lenient(br#"{"conversationFlags": ["A"]}"#);
        assert!(set.is_conversation_flagged("A"));
        assert!(set.message_flags.is_empty());
    }

    #[test]
    fn test_flag_and_clear() {
        let mut set = ManualOverrideSet::new();
        assert!(set.flag_conversation("A"));
        assert!(!set.flag_conversation("A"));
        assert!(set.flag_message("A", "m1"));
        assert!(set.flag_message("B", "m2"));

        assert!(set.clear_message("B", "m2"));
        assert!(!set.message_flags.contains_key("B"));
        assert!(!set.clear_message("B", "m2"));

        assert!(set.clear_conversation("A"));
        assert!(set.is_empty());
        assert!(!set.clear_conversation("A"));
    }
}
