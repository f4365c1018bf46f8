//! Dexto MCP - Named MCP server connections and capability aggregation.
//!
//! The [`McpManager`] maintains a set of named connections (stdio, SSE,
//! streamable-HTTP), aggregates their tools/prompts/resources into one
//! namespace, and routes tool calls. Connections run a per-server state
//! machine (`Connecting → Connected ↔ Error`, terminal `Disconnected`);
//! `lenient` servers reconnect with jittered exponential backoff, `strict`
//! servers abort subsequent calls on error.
//!
//! The wire protocol sits behind the [`McpService`] seam: the production
//! implementation speaks MCP through the official `rmcp` SDK, and tests
//! drive the manager with in-process fakes.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod manager;
mod rmcp_service;
mod service;
mod types;

pub use error::{McpError, McpResult};
pub use manager::{ConnectionStatus, McpManager, ServerSnapshot};
pub use rmcp_service::RmcpServiceFactory;
pub use service::{McpService, McpServiceFactory, ServerNotice};
pub use types::{AggregatedTool, McpToolResult, PromptDescriptor, ResourceDescriptor, ToolDescriptor};
