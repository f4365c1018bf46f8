//! Dexto Core - Foundation types for the Dexto agent runtime.
//!
//! This crate provides:
//! - Newtype identifiers used throughout the runtime
//! - Millisecond-precision timestamps
//! - The [`CancelToken`] cooperative cancellation primitive
//! - Retry utilities with exponential backoff

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod cancel;
mod ids;
mod retry;
mod timestamp;

pub use cancel::{CancelState, CancelToken, Cancelled};
pub use ids::{AgentId, AgentIdError, ApprovalId, RunId, SessionId, ToolCallId};
pub use retry::{BackoffSchedule, RetryConfig};
pub use timestamp::Timestamp;
