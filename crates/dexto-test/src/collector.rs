//! Event collection for assertions.

use dexto_events::{AgentEvent, EventBus, EventReceiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Drains an [`EventReceiver`] into an ordered log.
pub struct EventCollector {
    events: Arc<Mutex<Vec<Arc<AgentEvent>>>>,
    _task: tokio::task::JoinHandle<()>,
}

impl EventCollector {
    /// Subscribe to `bus` and start collecting.
    #[must_use]
    pub fn subscribe(bus: &EventBus) -> Self {
        Self::from_receiver(bus.subscribe())
    }

    /// Collect from an existing receiver.
    #[must_use]
    pub fn from_receiver(mut receiver: EventReceiver) -> Self {
        let events: Arc<Mutex<Vec<Arc<AgentEvent>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(event);
            }
        });
        Self {
            events,
            _task: task,
        }
    }

    /// Snapshot of all collected events, in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<Arc<AgentEvent>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Topic strings of all collected events, in arrival order.
    #[must_use]
    pub fn topics(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.topic()).collect()
    }

    /// Events matching one topic.
    #[must_use]
    pub fn with_topic(&self, topic: &str) -> Vec<Arc<AgentEvent>> {
        self.events()
            .into_iter()
            .filter(|e| e.topic() == topic)
            .collect()
    }

    /// Wait until at least `count` events with `topic` arrived, up to
    /// `timeout`. Returns whether the condition was met.
    pub async fn wait_for(&self, topic: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.with_topic(topic).len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Drop for EventCollector {
    fn drop(&mut self) {
        self._task.abort();
    }
}
