//! The reconciliation engine behind the support-message badge.
//!
//! Combines the authoritative conversation fetch, push-event deltas and manual override
//! flags into one published [`BadgeState`]. All mutation happens through `&mut self`;
//! the only suspension point is the conversation fetch, which is split into
//! [`ReconciliationEngine::begin_refresh`] and [`ReconciliationEngine::complete_refresh`]
//! so a driver can keep handling events while a fetch is in flight.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::collaborators::{ConversationSource, FetchError, OverrideSource};
use crate::config::BadgeTimings;
use crate::events::PushEvent;
use crate::models::{BadgeState, Conversation, ManualOverrideSet, SessionPhase};

use super::base_counter::FetchOutcome;
use super::clock::{Clock, SystemClock};
use super::manual_extra::manual_extra;
use super::scheduler::{Scheduler, TimerAction};
use super::session::SessionContext;

/// Permission to run one fetch, handed out by `begin_refresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    epoch: u64,
    seq: u64,
    forced: bool,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }
}

pub struct ReconciliationEngine {
    timings: BadgeTimings,
    clock: Arc<dyn Clock>,
    source: Arc<dyn ConversationSource>,
    override_source: Arc<dyn OverrideSource>,
    overrides: ManualOverrideSet,
    session: SessionContext,
    scheduler: Scheduler,
    state_tx: watch::Sender<BadgeState>,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn ConversationSource>,
        override_source: Arc<dyn OverrideSource>,
        timings: BadgeTimings,
    ) -> Self {
        let (state_tx, _) = watch::channel(BadgeState::default());
        Self {
            timings,
            clock: Arc::new(SystemClock),
            source,
            override_source,
            overrides: ManualOverrideSet::default(),
            session: SessionContext::unauthenticated(0),
            scheduler: Scheduler::new(),
            state_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // ===== Getters =====

    pub fn state(&self) -> BadgeState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BadgeState> {
        self.state_tx.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase
    }

    pub fn base_unread(&self) -> u32 {
        self.session.counter.base_unread()
    }

    pub fn snapshot(&self) -> &[Conversation] {
        self.session.counter.snapshot()
    }

    pub fn last_fetched_at(&self) -> Option<Instant> {
        self.session.counter.last_fetched_at()
    }

    pub fn suppress_until(&self) -> Option<Instant> {
        self.session.counter.suppress_until()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.user_id.as_deref()
    }

    pub fn timings(&self) -> &BadgeTimings {
        &self.timings
    }

    pub fn source(&self) -> Arc<dyn ConversationSource> {
        self.source.clone()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    // ===== Session lifecycle =====

    /// Reset to zero for `user_id`, arm the background poll and request the
    /// initial forced refresh.
    pub fn start_session(&mut self, user_id: &str) -> Option<FetchTicket> {
        self.scheduler.cancel_all();
        let epoch = self.session.epoch + 1;
        self.session = SessionContext::initializing(user_id.to_string(), epoch);
        self.overrides = self.override_source.read_overrides();
        tracing::info!(user = user_id, epoch, "badge session started");

        let now = self.clock.now();
        self.scheduler
            .schedule_after(now, self.timings.poll(), TimerAction::Poll);
        self.recompute();
        self.begin_refresh(true)
    }

    /// Drop every timer and counter. Results of fetches still in flight are ignored.
    pub fn end_session(&mut self) {
        self.scheduler.cancel_all();
        let epoch = self.session.epoch + 1;
        if let Some(user) = self.session.user_id.as_deref() {
            tracing::info!(user, epoch, "badge session ended");
        }
        self.session = SessionContext::unauthenticated(epoch);
        self.recompute();
    }

    // ===== Base counter =====

    /// Start a fetch unless it is debounced or suppressed (non-forced only).
    pub fn begin_refresh(&mut self, force: bool) -> Option<FetchTicket> {
        if !self.session.is_active() {
            tracing::debug!("refresh skipped: no active session");
            return None;
        }

        let now = self.clock.now();
        match self
            .session
            .counter
            .check_refresh(force, now, self.timings.debounce())
        {
            Ok(()) => {
                let seq = self.session.counter.issue_fetch(now);
                tracing::debug!(seq, force, "refresh started");
                Some(FetchTicket {
                    epoch: self.session.epoch,
                    seq,
                    forced: force,
                })
            }
            Err(reason) => {
                tracing::debug!(?reason, "refresh skipped");
                None
            }
        }
    }

    /// Apply the outcome of a fetch started with `begin_refresh`.
    /// Failures keep the last known state.
    pub fn complete_refresh(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<Conversation>, FetchError>,
    ) {
        if ticket.epoch != self.session.epoch {
            tracing::debug!(seq = ticket.seq, "ignoring fetch result from a previous session");
            return;
        }

        match result {
            Ok(conversations) => {
                let now = self.clock.now();
                match self
                    .session
                    .counter
                    .apply_fetch(ticket.seq, conversations, now)
                {
                    FetchOutcome::Applied { revalidated } => {
                        self.session.on_fetch_applied(revalidated);
                        self.recompute();
                    }
                    FetchOutcome::Stale => {
                        tracing::debug!(seq = ticket.seq, "discarding out-of-order fetch result");
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Conversation fetch failed, keeping last known state: {}", e);
                self.session.counter.fetch_failed(ticket.seq);
            }
        }
    }

    /// Run a refresh to completion. Returns false when it was skipped.
    pub async fn refresh(&mut self, force: bool) -> bool {
        let Some(ticket) = self.begin_refresh(force) else {
            return false;
        };
        let source = self.source.clone();
        let result = source.fetch_conversations().await;
        self.complete_refresh(ticket, result);
        true
    }

    pub async fn force_refresh(&mut self) -> bool {
        self.refresh(true).await
    }

    pub fn apply_increment(&mut self) {
        if !self.session.is_active() {
            return;
        }
        self.session.counter.increment();
        self.recompute();
    }

    /// With a count: subtract it and suppress non-forced refreshes for the suppression
    /// window. Without one: schedule a single delayed forced refresh instead of guessing.
    pub fn apply_read_adjustment(&mut self, count: Option<u32>) {
        if !self.session.is_active() {
            return;
        }
        let now = self.clock.now();

        match count {
            Some(count) => {
                let window = self.timings.suppression();
                self.session.counter.apply_read(count, now, window);
                self.session.on_read_adjustment();
                self.scheduler
                    .schedule_after(now, window, TimerAction::EndSuppression);
                self.recompute();
            }
            None => {
                if !self.scheduler.is_scheduled(TimerAction::DelayedRefresh) {
                    self.scheduler.schedule_after(
                        now,
                        self.timings.read_retry(),
                        TimerAction::DelayedRefresh,
                    );
                }
            }
        }
    }

    // ===== Event wiring =====

    /// Route a push event. Returns a ticket when the event calls for a fetch.
    pub fn handle_push_event(&mut self, event: &PushEvent) -> Option<FetchTicket> {
        if !self.session.is_active() {
            tracing::debug!(kind = event.kind(), "push event ignored: no active session");
            return None;
        }

        match event {
            PushEvent::NewMessage { recipient_id } => {
                if self.session.is_current_user(recipient_id) {
                    self.apply_increment();
                } else {
                    tracing::debug!(recipient = %recipient_id, "new-message for another user");
                }
                None
            }
            PushEvent::MessagesRead { count } => {
                self.apply_read_adjustment(*count);
                None
            }
            PushEvent::MessageSent {} => self.begin_refresh(false),
        }
    }

    /// Re-read the override store and republish.
    pub fn on_overrides_changed(&mut self) {
        self.overrides = self.override_source.read_overrides();
        self.recompute();
    }

    /// Run every timer due now. Returns the fetches they started.
    pub fn fire_due_timers(&mut self) -> Vec<FetchTicket> {
        let now = self.clock.now();
        let mut tickets = Vec::new();
        let mut phase_changed = false;

        for action in self.scheduler.drain_due(now) {
            match action {
                TimerAction::DelayedRefresh => {
                    tickets.extend(self.begin_refresh(true));
                }
                TimerAction::EndSuppression => {
                    let counter = &mut self.session.counter;
                    if counter.suppress_until().is_some_and(|until| until <= now) {
                        counter.end_suppression();
                        self.session.on_suppression_ended();
                        phase_changed = true;
                    }
                }
                TimerAction::Poll => {
                    self.scheduler
                        .schedule_after(now, self.timings.poll(), TimerAction::Poll);
                    tickets.extend(self.begin_refresh(true));
                }
            }
        }

        if phase_changed {
            self.recompute();
        }
        tickets
    }

    // ===== Publish =====

    /// Clear the attention flag without touching the count. The next recompute sets it
    /// again from the count.
    pub fn clear_notification(&mut self) {
        self.state_tx.send_if_modified(|state| {
            let was_set = state.has_notification;
            state.has_notification = false;
            was_set
        });
    }

    pub fn recompute(&mut self) -> BadgeState {
        self.recompute_with(None, None)
    }

    /// Recompute the combined count from `base_override` (or the current base) and
    /// `conversations` (or the cached snapshot), then publish it.
    pub fn recompute_with(
        &mut self,
        base_override: Option<u32>,
        conversations: Option<&[Conversation]>,
    ) -> BadgeState {
        let state = if self.session.is_active() {
            let counter = &self.session.counter;
            let extra = manual_extra(conversations.unwrap_or(counter.snapshot()), &self.overrides);
            let base = base_override.unwrap_or(counter.base_unread());
            BadgeState::new(base, extra, self.session.phase)
        } else {
            BadgeState::default()
        };

        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        state
    }
}
