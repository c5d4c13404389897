//! Base counter: the authoritative unread total plus locally applied push deltas.
//!
//! ## Fetch bookkeeping
//! Every fetch gets a sequence number when it is issued. A result is applied only if
//! it is newer than the last applied one, so out-of-order completions cannot roll the
//! count back.
//!
//! Local deltas (increments, read adjustments) applied while a fetch is in flight are
//! remembered with a marker equal to the next sequence number at the time. When fetch
//! `seq` lands, deltas with `marker > seq` happened after it was issued and are replayed
//! on top of its total; older deltas are assumed to be reflected server-side and dropped.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::models::{total_unread, Conversation};

/// Why a non-forced refresh was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A fetch was issued within the debounce window
    Debounced,
    /// A local read adjustment is waiting for the server to catch up
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result replaced the base count. `revalidated` is true when the fetch was
    /// issued after the latest read adjustment and therefore ends its suppression.
    Applied { revalidated: bool },
    /// A newer result was already applied
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct LocalDelta {
    marker: u64,
    delta: i64,
}

#[derive(Debug, Default)]
pub struct BaseCounter {
    base_unread: u32,
    snapshot: Vec<Conversation>,
    last_issued_at: Option<Instant>,
    last_fetched_at: Option<Instant>,
    suppress_until: Option<Instant>,
    /// Fetches with a sequence number >= this marker re-validate the suppressed state
    suppress_marker: Option<u64>,
    next_seq: u64,
    last_applied_seq: Option<u64>,
    in_flight: BTreeSet<u64>,
    pending_deltas: Vec<LocalDelta>,
}

impl BaseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Getters =====

    pub fn base_unread(&self) -> u32 {
        self.base_unread
    }

    pub fn snapshot(&self) -> &[Conversation] {
        &self.snapshot
    }

    pub fn last_fetched_at(&self) -> Option<Instant> {
        self.last_fetched_at
    }

    pub fn suppress_until(&self) -> Option<Instant> {
        self.suppress_until
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.suppress_until.is_some_and(|until| now < until)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Decide whether a refresh may start now. Forced refreshes always may.
    pub fn check_refresh(
        &self,
        force: bool,
        now: Instant,
        debounce: Duration,
    ) -> Result<(), SkipReason> {
        if force {
            return Ok(());
        }
        if self.is_suppressed(now) {
            return Err(SkipReason::Suppressed);
        }
        if self
            .last_issued_at
            .is_some_and(|issued| now.saturating_duration_since(issued) < debounce)
        {
            return Err(SkipReason::Debounced);
        }
        Ok(())
    }

    // ===== Fetch lifecycle =====

    /// Record that a fetch is starting and return its sequence number.
    pub fn issue_fetch(&mut self, now: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(seq);
        self.last_issued_at = Some(now);
        seq
    }

    pub fn fetch_failed(&mut self, seq: u64) {
        self.finish(seq);
    }

    pub fn apply_fetch(
        &mut self,
        seq: u64,
        conversations: Vec<Conversation>,
        now: Instant,
    ) -> FetchOutcome {
        if self.last_applied_seq.is_some_and(|applied| seq <= applied) {
            self.finish(seq);
            return FetchOutcome::Stale;
        }

        let replay: i64 = self
            .pending_deltas
            .iter()
            .filter(|d| d.marker > seq)
            .map(|d| d.delta)
            .sum();
        self.base_unread = clamp_count(i64::from(total_unread(&conversations)) + replay);
        self.snapshot = conversations;
        self.last_fetched_at = Some(now);
        self.last_applied_seq = Some(seq);

        self.pending_deltas.retain(|d| d.marker > seq);
        self.finish(seq);

        let revalidated = self.suppress_marker.is_some_and(|marker| seq >= marker);
        if revalidated {
            self.end_suppression();
        }
        FetchOutcome::Applied { revalidated }
    }

    fn finish(&mut self, seq: u64) {
        self.in_flight.remove(&seq);
        if self.in_flight.is_empty() {
            self.pending_deltas.clear();
        }
    }

    // ===== Local adjustments =====

    pub fn increment(&mut self) {
        self.base_unread = self.base_unread.saturating_add(1);
        self.record_delta(1);
    }

    /// Subtract `count` (clamped at zero) and open a suppression window.
    pub fn apply_read(&mut self, count: u32, now: Instant, window: Duration) {
        self.base_unread = self.base_unread.saturating_sub(count);
        self.record_delta(-i64::from(count));
        self.suppress_until = Some(now + window);
        self.suppress_marker = Some(self.next_seq);
    }

    pub fn end_suppression(&mut self) {
        self.suppress_until = None;
        self.suppress_marker = None;
    }

    fn record_delta(&mut self, delta: i64) {
        if !self.in_flight.is_empty() {
            self.pending_deltas.push(LocalDelta {
                marker: self.next_seq,
                delta,
            });
        }
    }
}

fn clamp_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
