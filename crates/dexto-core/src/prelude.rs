//! Convenience re-exports for downstream crates.

pub use crate::cancel::{CancelState, CancelToken, Cancelled};
pub use crate::ids::{AgentId, ApprovalId, RunId, SessionId, ToolCallId};
pub use crate::retry::RetryConfig;
pub use crate::timestamp::Timestamp;
