//! Dexto Plugins - Ordered extension points around LLM and tool calls.
//!
//! Plugins are injected as *instances*; resolving a module reference into
//! an instance is the enrichment layer's job. Each plugin implements any
//! subset of the six hooks and is registered with a name, a priority, and
//! a blocking flag:
//!
//! - Hooks run in ascending priority (ties break by registration order).
//! - A failing **blocking** plugin aborts the hook with
//!   [`PluginError::Blocking`]; a failing non-blocking plugin is logged
//!   and skipped.
//! - Only blocking plugins mutate payloads or short-circuit; non-blocking
//!   plugins observe. A short-circuit bypasses later plugins for that hook
//!   invocation only.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod hooks;
mod manager;

pub use context::{AgentFacade, PluginContext};
pub use error::{PluginError, PluginResult};
pub use hooks::{
    LlmRequestAction, LlmRequestPayload, Plugin, ResponseAction, ToolCallAction, ToolCallPayload,
    ToolResultAction, ToolResultPayload,
};
pub use manager::{PluginEntry, PluginManager};
