//! Event subscriber trait and registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::event::AgentEvent;

/// Trait for synchronous event subscribers.
///
/// Subscribers must not block: `on_event` runs inline on the emitter's
/// task. For heavy processing use an async [`EventReceiver`](crate::EventReceiver)
/// and buffer on your own side.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event is published.
    fn on_event(&self, event: &AgentEvent);

    /// Optional filter. Return `false` to skip the event.
    fn accepts(&self, event: &AgentEvent) -> bool {
        let _ = event;
        true
    }

    /// Optional name for debugging.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Registration handle for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Registry for managing synchronous event subscribers.
///
/// Dispatch iterates over a snapshot taken under a read lock, so a
/// subscriber removed mid-dispatch still receives the event currently
/// being delivered.
struct Registration {
    subscriber: Arc<dyn EventSubscriber>,
    once: bool,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Registration>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.subscribers.read().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("SubscriberRegistry")
            .field("subscriber_count", &count)
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create a new subscriber registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber. Returns a handle for unregistering.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        self.insert(subscriber, false)
    }

    /// Register a one-shot subscriber: it receives the first event it
    /// accepts and is then removed automatically.
    pub fn register_once(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        self.insert(subscriber, true)
    }

    fn insert(&self, subscriber: Arc<dyn EventSubscriber>, once: bool) -> SubscriberId {
        let id = SubscriberId::new();
        let name = subscriber.name().to_string();

        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subs.insert(id, Registration { subscriber, once });

        debug!(subscriber_name = %name, once, "Subscriber registered");
        id
    }

    /// Unregister a subscriber. Returns `true` if it was present.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let removed = subs.remove(&id).is_some();
        if removed {
            debug!("Subscriber unregistered");
        }
        removed
    }

    /// Notify all subscribers of an event.
    ///
    /// Panics in one subscriber are caught and logged so the others still
    /// receive the event.
    pub fn notify(&self, event: &AgentEvent) {
        let snapshot: Vec<(SubscriberId, Arc<dyn EventSubscriber>, bool)> = {
            let subs = self
                .subscribers
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            subs.iter()
                .map(|(id, r)| (*id, Arc::clone(&r.subscriber), r.once))
                .collect()
        };

        let mut spent = Vec::new();
        for (id, subscriber, once) in snapshot {
            if !subscriber.accepts(event) {
                continue;
            }
            trace!(
                subscriber_name = %subscriber.name(),
                topic = %event.topic(),
                "Notifying subscriber"
            );

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_event(event);
            }));

            if let Err(e) = result {
                warn!(
                    subscriber_id = ?id,
                    subscriber_name = %subscriber.name(),
                    error = ?e,
                    "Subscriber panicked"
                );
            }
            if once {
                spent.push(id);
            }
        }
        for id in spent {
            self.unregister(id);
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .map(|s| s.len())
            .unwrap_or_default()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
