//! Event bus for broadcasting events to subscribers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::event::AgentEvent;
use crate::subscriber::SubscriberRegistry;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Event bus for broadcasting events to all subscribers.
///
/// Synchronous subscribers are notified first, in dispatch order; async
/// receivers then get the event through a broadcast channel. Within one
/// emitter, events arrive at any given subscriber in emission order.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events.
    sender: broadcast::Sender<Arc<AgentEvent>>,
    /// Registry for synchronous subscribers.
    registry: SubscriberRegistry,
    /// Channel capacity.
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            registry: SubscriberRegistry::new(),
            capacity,
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of async receivers that received the event.
    pub fn publish(&self, event: AgentEvent) -> usize {
        let event = Arc::new(event);

        trace!(topic = %event.topic(), "Publishing event");

        self.registry.notify(&event);

        if let Ok(count) = self.sender.send(Arc::clone(&event)) {
            debug!(topic = %event.topic(), receiver_count = count, "Event published");
            count
        } else {
            // No receivers - this is fine
            trace!(topic = %event.topic(), "No receivers for event");
            0
        }
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will receive all subsequently published events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the synchronous subscriber registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Get the current number of active async subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for events from the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<AgentEvent>>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` when the channel is closed. Lagged receivers skip the
    /// dropped events with a warning and keep receiving.
    pub async fn recv(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive the next event without blocking.
    pub fn try_recv(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexto_core::SessionId;

    fn reset_event() -> AgentEvent {
        AgentEvent::ConversationReset {
            session_id: SessionId::from("s1"),
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        let count = bus.publish(reset_event());
        assert_eq!(count, 1);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.topic(), "dexto:conversationReset");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();

        let count = bus.publish(reset_event());
        assert_eq!(count, 2);

        assert_eq!(r1.recv().await.unwrap().topic(), "dexto:conversationReset");
        assert_eq!(r2.recv().await.unwrap().topic(), "dexto:conversationReset");
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(reset_event()), 0);
    }

    #[tokio::test]
    async fn test_ordering_within_emitter() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        for i in 0..5 {
            bus.publish(AgentEvent::SessionTitleUpdated {
                session_id: SessionId::from("s1"),
                title: format!("t{i}"),
            });
        }

        for i in 0..5 {
            let event = receiver.recv().await.unwrap();
            match event.as_ref() {
                AgentEvent::SessionTitleUpdated { title, .. } => {
                    assert_eq!(title, &format!("t{i}"));
                },
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert!(receiver.try_recv().is_none());
        bus.publish(reset_event());
        assert!(receiver.try_recv().is_some());
    }
}
