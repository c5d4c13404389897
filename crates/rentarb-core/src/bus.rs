//! In-process signaling bus with RAII subscriptions.
//!
//! Every `subscribe` call returns a [`Subscription`]; dropping it (or calling
//! [`Subscription::release`]) removes the handler. Owners that hold several
//! subscriptions collect them in a [`SubscriptionSet`] and release them together.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle to a registered handler. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Subscriptions acquired together and released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release in reverse acquisition order.
    pub fn release_all(&mut self) {
        while let Some(subscription) = self.subscriptions.pop() {
            subscription.release();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Thread-safe fan-out of `T` values to registered handlers.
pub struct SignalBus<T> {
    handlers: Arc<Mutex<BTreeMap<u64, Handler<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for SignalBus<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for SignalBus<T> {
    fn default() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T: 'static> SignalBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().insert(id, Arc::new(handler));

        let handlers = Arc::downgrade(&self.handlers);
        Subscription::new(move || {
            if let Some(handlers) = handlers.upgrade() {
                handlers.lock().remove(&id);
            }
        })
    }

    /// Deliver `value` to every handler registered at the time of the call.
    /// Handlers run outside the lock, so they may subscribe or unsubscribe.
    pub fn emit(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self.handlers.lock().values().cloned().collect();
        for handler in handlers {
            handler(value);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}
