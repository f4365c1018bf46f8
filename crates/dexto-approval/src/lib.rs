//! Dexto Approval - Decides whether a tool call may proceed.
//!
//! The [`ApprovalManager`] mediates every tool invocation through a
//! layered decision: static policy lists, per-session remembered choices,
//! the configured mode, and, in manual mode, a registered
//! [`ApprovalHandler`] raced against a timeout and the run's cancel token.
//!
//! The handler is a direct callable, not a bus subscriber. Bus events
//! (`dexto:approvalRequest` / `dexto:approvalResponse`) are notification
//! only, so transports can render UI; they never carry decisions.
//!
//! Every request settles exactly once, to exactly one of
//! `approved | denied | cancelled | timed_out`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod manager;
mod policy;
mod request;

pub use dexto_events::{ApprovalKind, ApprovalStatus};
pub use error::{ApprovalError, ApprovalResult};
pub use manager::{ApprovalHandler, ApprovalManager};
pub use policy::{ApprovalMode, ApprovalPolicy, CacheStorage};
pub use request::{ApprovalOutcome, ApprovalRequest, HandlerResponse, HandlerVerdict};
