//! Deadline queue for the engine's delayed work.
//!
//! The scheduler never sleeps or spawns; the owner asks for [`Scheduler::next_deadline`],
//! waits however it likes, then drains due actions with [`Scheduler::drain_due`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Delayed work the engine can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Forced refresh after a `messages-read` event that carried no count
    DelayedRefresh,
    /// End of a suppression window
    EndSuppression,
    /// Background poll; re-armed every time it fires
    Poll,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    entries: BTreeMap<(Instant, u64), TimerAction>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, deadline: Instant, action: TimerAction) {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert((deadline, id), action);
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration, action: TimerAction) {
        self.schedule_at(now + delay, action);
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every action due at `now`, earliest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<TimerAction> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub fn is_scheduled(&self, action: TimerAction) -> bool {
        self.entries.values().any(|a| *a == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_deadline_order() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule_after(now, Duration::from_secs(15), TimerAction::EndSuppression);
        scheduler.schedule_after(now, Duration::from_secs(3), TimerAction::DelayedRefresh);
        scheduler.schedule_after(now, Duration::from_secs(60), TimerAction::Poll);

        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_secs(3)));
        assert!(scheduler.drain_due(now).is_empty());

        let due = scheduler.drain_due(now + Duration::from_secs(15));
        assert_eq!(
            due,
            vec![TimerAction::DelayedRefresh, TimerAction::EndSuppression]
        );
        assert_eq!(scheduler.pending(), 1);
        assert!(scheduler.is_scheduled(TimerAction::Poll));
    }

    #[test]
    fn test_same_deadline_keeps_insertion_order() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(now, TimerAction::Poll);
        scheduler.schedule_at(now, TimerAction::DelayedRefresh);

        assert_eq!(
            scheduler.drain_due(now),
            vec![TimerAction::Poll, TimerAction::DelayedRefresh]
        );
    }

    #[test]
    fn test_cancel_all() {
        let now = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule_after(now, Duration::from_secs(1), TimerAction::Poll);
        scheduler.schedule_after(now, Duration::from_secs(2), TimerAction::DelayedRefresh);
        assert_eq!(scheduler.pending(), 2);

        scheduler.cancel_all();
        assert_eq!(scheduler.next_deadline(), None);
    }
}
