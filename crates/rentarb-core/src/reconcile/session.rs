use crate::models::SessionPhase;

use super::base_counter::BaseCounter;

/// Per-session reconciliation state, owned by the engine.
///
/// Created fresh on every session start and on sign-out; nothing survives across
/// sessions except the epoch counter, which lets late fetch results be recognized
/// and dropped.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub user_id: Option<String>,
    pub epoch: u64,
    pub phase: SessionPhase,
    pub counter: BaseCounter,
    /// Whether any authoritative fetch has been applied in this session
    pub fetched: bool,
}

impl SessionContext {
    pub fn unauthenticated(epoch: u64) -> Self {
        Self {
            user_id: None,
            epoch,
            phase: SessionPhase::Unauthenticated,
            counter: BaseCounter::new(),
            fetched: false,
        }
    }

    pub fn initializing(user_id: String, epoch: u64) -> Self {
        Self {
            user_id: Some(user_id),
            epoch,
            phase: SessionPhase::Initializing,
            counter: BaseCounter::new(),
            fetched: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase != SessionPhase::Unauthenticated
    }

    pub fn is_current_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    /// Phase after a successful fetch.
    pub fn on_fetch_applied(&mut self, revalidated: bool) {
        self.fetched = true;
        self.phase = match self.phase {
            SessionPhase::Initializing => SessionPhase::Synced,
            SessionPhase::PendingLocalUpdate if revalidated => SessionPhase::Synced,
            phase => phase,
        };
    }

    pub fn on_read_adjustment(&mut self) {
        if self.is_active() {
            self.phase = SessionPhase::PendingLocalUpdate;
        }
    }

    /// Without an applied fetch the session falls back to `Initializing`.
    pub fn on_suppression_ended(&mut self) {
        if self.phase == SessionPhase::PendingLocalUpdate {
            self.phase = if self.fetched {
                SessionPhase::Synced
            } else {
                SessionPhase::Initializing
            };
        }
    }
}
