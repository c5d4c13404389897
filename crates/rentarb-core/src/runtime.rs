//! Async driver for [`ReconciliationEngine`].
//!
//! The engine runs on a single tokio task. Commands, push events, override changes,
//! fetch completions and timer deadlines are multiplexed with `tokio::select!`, so the
//! engine never sees two mutations at once while fetches still overlap freely.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::bus::SubscriptionSet;
use crate::collaborators::{ConversationSource, FetchError, OverrideSource, PushChannel};
use crate::events::{OverrideChange, PushEvent};
use crate::models::{BadgeState, Conversation};
use crate::reconcile::{FetchTicket, ReconciliationEngine};

pub enum BadgeCommand {
    SignIn { user_id: String },
    SignOut,
    Refresh { force: bool },
    ClearNotification,
    /// Apply everything already queued and wait for in-flight fetches, then reply
    Flush { reply: oneshot::Sender<()> },
    Shutdown,
}

#[derive(Clone)]
pub struct BadgeHandle {
    command_tx: mpsc::UnboundedSender<BadgeCommand>,
    state_rx: watch::Receiver<BadgeState>,
}

impl BadgeHandle {
    pub fn send(&self, command: BadgeCommand) -> Result<(), mpsc::error::SendError<BadgeCommand>> {
        self.command_tx.send(command)
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let _ = self.send(BadgeCommand::SignIn {
            user_id: user_id.into(),
        });
    }

    pub fn sign_out(&self) {
        let _ = self.send(BadgeCommand::SignOut);
    }

    pub fn refresh(&self, force: bool) {
        let _ = self.send(BadgeCommand::Refresh { force });
    }

    pub fn clear_notification(&self) {
        let _ = self.send(BadgeCommand::ClearNotification);
    }

    /// Wait until commands sent before this call, queued push events and in-flight
    /// fetches have been applied. Returns false if the driver has stopped.
    pub async fn flush(&self) -> bool {
        let (reply, done) = oneshot::channel();
        if self.send(BadgeCommand::Flush { reply }).is_err() {
            return false;
        }
        done.await.is_ok()
    }

    /// Latest published badge state.
    pub fn state(&self) -> BadgeState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BadgeState> {
        self.state_rx.clone()
    }
}

type FetchFuture = BoxFuture<'static, (FetchTicket, Result<Vec<Conversation>, FetchError>)>;

pub struct BadgeRuntime {
    handle: BadgeHandle,
    task: Option<JoinHandle<()>>,
}

impl BadgeRuntime {
    /// Subscribe to `push` and `overrides`, then spawn the driver task.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        engine: ReconciliationEngine,
        push: &dyn PushChannel,
        overrides: &dyn OverrideSource,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel::<PushEvent>();
        let (override_tx, override_rx) = mpsc::unbounded_channel::<()>();

        let mut subscriptions = SubscriptionSet::new();
        subscriptions.push(push.on_push_event(Box::new(move |event: &PushEvent| {
            let _ = push_tx.send(event.clone());
        })));
        subscriptions.push(overrides.subscribe_override_changes(Box::new(
            move |change: &OverrideChange| {
                tracing::trace!(?change, "override change");
                let _ = override_tx.send(());
            },
        )));

        let state_rx = engine.subscribe();
        let driver = Driver {
            engine,
            command_rx,
            push_rx,
            override_rx,
            fetches: FuturesUnordered::new(),
            subscriptions,
        };
        let task = tokio::spawn(driver.run());

        Self {
            handle: BadgeHandle {
                command_tx,
                state_rx,
            },
            task: Some(task),
        }
    }

    pub fn handle(&self) -> BadgeHandle {
        self.handle.clone()
    }

    /// Stop the driver and wait for it. Subscriptions are released before this returns.
    pub async fn shutdown(&mut self) {
        let _ = self.handle.send(BadgeCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Badge driver task failed: {}", e);
            }
        }
    }
}

struct Driver {
    engine: ReconciliationEngine,
    command_rx: mpsc::UnboundedReceiver<BadgeCommand>,
    push_rx: mpsc::UnboundedReceiver<PushEvent>,
    override_rx: mpsc::UnboundedReceiver<()>,
    fetches: FuturesUnordered<FetchFuture>,
    subscriptions: SubscriptionSet,
}

impl Driver {
    async fn run(mut self) {
        tracing::debug!("badge driver started");

        loop {
            let deadline = self.engine.next_deadline();
            // Commands first, so a sign-in queued before push events is applied before them
            tokio::select! {
                biased;

                command = self.command_rx.recv() => {
                    match command {
                        Some(BadgeCommand::Shutdown) | None => break,
                        Some(BadgeCommand::Flush { reply }) => {
                            self.flush().await;
                            let _ = reply.send(());
                        }
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(event) = self.push_rx.recv() => {
                    let ticket = self.engine.handle_push_event(&event);
                    self.start_fetches(ticket);
                }
                Some(()) = self.override_rx.recv() => {
                    // Coalesce bursts into one recompute
                    while self.override_rx.try_recv().is_ok() {}
                    self.engine.on_overrides_changed();
                }
                Some((ticket, result)) = self.fetches.next(), if !self.fetches.is_empty() => {
                    self.engine.complete_refresh(ticket, result);
                }
                _ = sleep_until(deadline) => {
                    let tickets = self.engine.fire_due_timers();
                    self.start_fetches(tickets);
                }
            }
        }

        self.engine.end_session();
        self.subscriptions.release_all();
        tracing::debug!("badge driver stopped");
    }

    async fn flush(&mut self) {
        loop {
            if self.override_rx.try_recv().is_ok() {
                while self.override_rx.try_recv().is_ok() {}
                self.engine.on_overrides_changed();
            }
            while let Ok(event) = self.push_rx.try_recv() {
                let ticket = self.engine.handle_push_event(&event);
                self.start_fetches(ticket);
            }
            match self.fetches.next().await {
                Some((ticket, result)) => self.engine.complete_refresh(ticket, result),
                None => break,
            }
        }
    }

    fn handle_command(&mut self, command: BadgeCommand) {
        let ticket = match command {
            BadgeCommand::SignIn { user_id } => self.engine.start_session(&user_id),
            BadgeCommand::SignOut => {
                self.engine.end_session();
                None
            }
            BadgeCommand::Refresh { force } => self.engine.begin_refresh(force),
            BadgeCommand::ClearNotification => {
                self.engine.clear_notification();
                None
            }
            BadgeCommand::Flush { .. } | BadgeCommand::Shutdown => None,
        };
        self.start_fetches(ticket);
    }

    fn start_fetches(&mut self, tickets: impl IntoIterator<Item = FetchTicket>) {
        for ticket in tickets {
            self.fetches
                .push(fetch(self.engine.source(), ticket).boxed());
        }
    }
}

async fn fetch(
    source: Arc<dyn ConversationSource>,
    ticket: FetchTicket,
) -> (FetchTicket, Result<Vec<Conversation>, FetchError>) {
    let result = source.fetch_conversations().await;
    (ticket, result)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BadgeTimings;
    use crate::models::SessionPhase;
    use crate::sources::MemoryConversationSource;
    use crate::store::OverrideStore;
    use crate::streaming::PushBus;
    use std::time::Duration;

    struct Fixture {
        runtime: BadgeRuntime,
        source: Arc<MemoryConversationSource>,
        overrides: Arc<OverrideStore>,
        push: PushBus,
    }

    fn fixture(conversations: Vec<Conversation>) -> Fixture {
        let source = Arc::new(MemoryConversationSource::new(conversations));
        let overrides = Arc::new(OverrideStore::in_memory());
        let push = PushBus::new();
        let engine =
            ReconciliationEngine::new(source.clone(), overrides.clone(), BadgeTimings::default());
        let runtime = BadgeRuntime::spawn(engine, &push, overrides.as_ref());
        Fixture {
            runtime,
            source,
            overrides,
            push,
        }
    }

    async fn wait_for(
        rx: &mut watch::Receiver<BadgeState>,
        predicate: impl FnMut(&BadgeState) -> bool,
    ) -> BadgeState {
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for badge state")
            .expect("badge driver stopped");
        *state
    }

    #[tokio::test]
    async fn test_sign_in_publishes_fetched_count() {
        let mut f = fixture(vec![Conversation::new("A", 0), Conversation::new("B", 1)]);
        let handle = f.runtime.handle();
        let mut rx = handle.subscribe();

        handle.sign_in("admin");
        let state = wait_for(&mut rx, |s| s.phase == SessionPhase::Synced).await;
        assert_eq!(state.combined_count, 1);
        assert!(state.has_notification);
        assert_eq!(f.source.fetch_count(), 1);

        f.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_push_and_override_signals_reach_engine() {
        let mut f = fixture(vec![Conversation::new("A", 0), Conversation::new("B", 1)]);
        let handle = f.runtime.handle();
        let mut rx = handle.subscribe();
        handle.sign_in("admin");
        wait_for(&mut rx, |s| s.phase == SessionPhase::Synced).await;

        f.push.publish(PushEvent::NewMessage {
            recipient_id: "admin".to_string(),
        });
        wait_for(&mut rx, |s| s.combined_count == 2).await;

        f.overrides.flag_conversation("A").unwrap();
        let state = wait_for(&mut rx, |s| s.combined_count == 3).await;
        assert_eq!(state.manual_extra, 1);

        f.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_sign_out_and_clear_notification() {
        let mut f = fixture(vec![Conversation::new("A", 2)]);
        let handle = f.runtime.handle();
        let mut rx = handle.subscribe();
        handle.sign_in("admin");
        wait_for(&mut rx, |s| s.combined_count == 2).await;

        handle.clear_notification();
        let state = wait_for(&mut rx, |s| !s.has_notification).await;
        assert_eq!(state.combined_count, 2);

        handle.sign_out();
        let state = wait_for(&mut rx, |s| s.phase == SessionPhase::Unauthenticated).await;
        assert_eq!(state, BadgeState::default());

        f.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_flush_applies_queued_events_and_fetches() {
        let mut f = fixture(vec![Conversation::new("A", 0), Conversation::new("B", 1)]);
        let handle = f.runtime.handle();

        handle.sign_in("admin");
        for _ in 0..2 {
            f.push.publish(PushEvent::NewMessage {
                recipient_id: "admin".to_string(),
            });
        }
        assert!(handle.flush().await);

        let state = handle.state();
        assert_eq!(state.combined_count, 3);
        assert_eq!(state.phase, SessionPhase::Synced);
        assert_eq!(f.source.fetch_count(), 1);

        f.runtime.shutdown().await;
        assert!(!handle.flush().await);
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscriptions() {
        let mut f = fixture(Vec::new());
        assert_eq!(f.push.subscriber_count(), 1);

        f.runtime.shutdown().await;
        assert_eq!(f.push.subscriber_count(), 0);
        assert!(f
            .runtime
            .handle()
            .send(BadgeCommand::SignOut)
            .is_err());
    }
}
