// ── Event bus ──
//
// Topic → ordered list of callbacks. Delivery is synchronous and happens
// after the registry lock is released, so callbacks may subscribe or
// unsubscribe from inside a delivery. A callback that errors or panics is
// logged and skipped; the rest still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::event::DomainEvent;

/// Error a callback may return to report a failed delivery.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A subscriber callback.
pub type Callback = Arc<dyn Fn(&DomainEvent) -> Result<(), CallbackError> + Send + Sync>;

/// Handle returned by [`EventBus::on`]; pass it to [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Outcome of one [`EventBus::emit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// In-process publish/subscribe register keyed by topic.
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<String, Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `topic`. Callbacks run in registration order.
    pub fn on<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&DomainEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .entry(topic.to_owned())
            .or_default()
            .push((id, Arc::new(callback)));
        trace!(topic, ?id, "subscribed");
        id
    }

    /// Remove a registration. Unknown topics or ids are ignored.
    pub fn off(&self, topic: &str, id: SubscriptionId) {
        let now_empty = match self.subscribers.get_mut(topic) {
            Some(mut subs) => {
                subs.retain(|(sub, _)| *sub != id);
                subs.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.subscribers.remove_if(topic, |_, subs| subs.is_empty());
        }
    }

    /// Deliver `event` to every subscriber of `topic`.
    pub fn emit(&self, topic: &str, event: &DomainEvent) -> Delivery {
        // Clone the list so no shard lock is held while callbacks run.
        let callbacks: Vec<(SubscriptionId, Callback)> = match self.subscribers.get(topic) {
            Some(subs) => subs.clone(),
            None => return Delivery::default(),
        };

        let mut delivery = Delivery::default();
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    warn!(topic, ?id, error = %e, "subscriber callback failed");
                }
                Err(panic) => {
                    delivery.failed += 1;
                    warn!(topic, ?id, panic = panic_message(panic.as_ref()), "subscriber callback panicked");
                }
            }
        }
        delivery
    }

    /// Emit on the event's own topic.
    pub fn publish(&self, event: &DomainEvent) -> Delivery {
        self.emit(&event.topic, event)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.get(topic).map_or(0, |subs| subs.len())
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.subscribers.clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
