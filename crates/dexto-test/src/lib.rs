//! Dexto Test - Shared test doubles for the Dexto workspace.
//!
//! - [`ScriptedLlmClient`]: plays back scripted stream events, one script
//!   per `stream` call, honouring cancellation between events
//! - [`StaticApprovalHandler`] / [`ChannelApprovalHandler`]: canned and
//!   test-driven approval decisions
//! - [`EventCollector`]: drains an [`EventReceiver`] into an ordered,
//!   queryable log

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod approvals;
mod collector;
mod llm;

pub use approvals::{ChannelApprovalHandler, StaticApprovalHandler};
pub use collector::EventCollector;
pub use llm::{ScriptedLlmClient, ScriptedTurn};
