//! The transport seam between the manager and the wire protocol.

use async_trait::async_trait;
use dexto_config::McpServerConfig;
use dexto_core::CancelToken;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::McpResult;
use crate::types::{McpToolResult, PromptDescriptor, ResourceDescriptor, ToolDescriptor};

/// Server-driven change notifications surfaced to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotice {
    /// The server's tool list changed; the manager re-lists and rebuilds
    /// its aggregate index.
    ToolsChanged {
        /// The server that changed.
        server: String,
    },
    /// A resource changed on the server.
    ResourceUpdated {
        /// The server that changed.
        server: String,
        /// The resource URI.
        uri: String,
    },
}

/// One live MCP connection.
#[async_trait]
pub trait McpService: Send + Sync {
    /// List the server's tools.
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>>;

    /// List the server's prompts.
    async fn list_prompts(&self) -> McpResult<Vec<PromptDescriptor>>;

    /// List the server's resources.
    async fn list_resources(&self) -> McpResult<Vec<ResourceDescriptor>>;

    /// Call a tool. Implementations observe `cancel` and abort the
    /// in-flight request when it fires.
    async fn call_tool(
        &self,
        tool: &str,
        args: Value,
        cancel: &CancelToken,
    ) -> McpResult<McpToolResult>;

    /// Close the connection. Idempotent.
    async fn shutdown(&self) -> McpResult<()>;
}

/// Opens connections from validated server specs.
#[async_trait]
pub trait McpServiceFactory: Send + Sync {
    /// Connect to the server described by `spec`.
    ///
    /// `notices` receives server-driven change notifications for the
    /// lifetime of the connection.
    async fn connect(
        &self,
        name: &str,
        spec: &McpServerConfig,
        notices: mpsc::UnboundedSender<ServerNotice>,
    ) -> McpResult<Arc<dyn McpService>>;
}
