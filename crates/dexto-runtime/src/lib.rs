//! Dexto Runtime - The orchestration kernel.
//!
//! This crate ties the services together:
//!
//! - [`ChatSession`]: the per-session run loop, with cancellable, queueable
//!   iterations over LLM and tool calls with a strict event and history
//!   discipline
//! - [`SessionManager`]: bounded session table with single-writer
//!   semantics, lazy loading, LRU eviction, and a TTL sweeper
//! - [`DextoAgent`]: the public facade: lifecycle, reload, LLM switch,
//!   handler and MCP and plugin registration
//!
//! Ownership is strictly downward: the agent owns the services; services
//! hold the bus and logger, which are constructed first and outlive them;
//! plugin contexts reach back to the agent through a weak handle only.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod agent;
mod error;
mod prompt;
mod services;
mod session;
mod sessions;
mod state;
mod store;

pub use agent::{AgentStatus, DextoAgent, DextoAgentBuilder, ReloadReport};
pub use error::{RuntimeError, RuntimeResult};
pub use prompt::{DynamicContributor, SystemPromptComposer};
pub use services::SessionServices;
pub use session::ChatSession;
pub use sessions::SessionManager;
pub use state::{QueuedMessage, RunOutcome, RunState};
pub use store::{SessionRecord, SessionStore};
