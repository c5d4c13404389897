use serde::{Deserialize, Serialize};

/// Lifecycle phase of a reconciliation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    /// No active session; every counter is zero
    #[default]
    Unauthenticated,
    /// Session started, first authoritative fetch not yet applied
    Initializing,
    Synced,
    /// A local read adjustment was applied and the server may not have caught up yet
    PendingLocalUpdate,
}

/// The published badge value.
///
/// `combined_count` and `has_notification` are what the UI renders; the remaining
/// fields are diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeState {
    pub combined_count: u32,
    pub has_notification: bool,
    pub base_unread: u32,
    pub manual_extra: u32,
    pub phase: SessionPhase,
}

impl BadgeState {
    pub fn new(base_unread: u32, manual_extra: u32, phase: SessionPhase) -> Self {
        let combined_count = base_unread.saturating_add(manual_extra);
        Self {
            combined_count,
            has_notification: combined_count > 0,
            base_unread,
            manual_extra,
            phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_and_flag() {
        let state = BadgeState::new(2, 1, SessionPhase::Synced);
        assert_eq!(state.combined_count, 3);
        assert!(state.has_notification);

        let empty = BadgeState::new(0, 0, SessionPhase::Synced);
        assert_eq!(empty.combined_count, 0);
        assert!(!empty.has_notification);
    }

    #[test]
    fn test_serialized_shape() {
        let state = BadgeState::new(1, 0, SessionPhase::PendingLocalUpdate);
        let value = serde_json::to_value(state).unwrap();
        assert_eq!(value["combinedCount"], 1);
        assert_eq!(value["hasNotification"], true);
        assert_eq!(value["phase"], "pending-local-update");
    }
}
