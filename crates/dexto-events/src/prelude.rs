//! Convenience re-exports for downstream crates.

pub use crate::bus::{EventBus, EventReceiver};
pub use crate::event::{AgentEvent, ApprovalKind, ApprovalStatus, ChunkKind};
pub use crate::subscriber::{EventSubscriber, SubscriberRegistry};
