//! rmcp-backed [`McpService`] implementation.
//!
//! Speaks MCP through the official Rust SDK over the three supported
//! transports. Stdio servers are spawned as child processes; SSE and
//! streamable-HTTP servers are reached over the network.

use async_trait::async_trait;
use dexto_config::McpServerConfig;
use dexto_core::CancelToken;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::sse_client::SseClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::transport::TokioChildProcess;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::error::{McpError, McpResult};
use crate::service::{McpService, McpServiceFactory, ServerNotice};
use crate::types::{McpToolResult, PromptDescriptor, ResourceDescriptor, ToolDescriptor};

/// Connects to servers through the `rmcp` SDK.
#[derive(Debug, Default)]
pub struct RmcpServiceFactory;

impl RmcpServiceFactory {
    /// Create a factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl McpServiceFactory for RmcpServiceFactory {
    async fn connect(
        &self,
        name: &str,
        spec: &McpServerConfig,
        notices: mpsc::UnboundedSender<ServerNotice>,
    ) -> McpResult<Arc<dyn McpService>> {
        let handler = NoticeHandler {
            server: name.to_owned(),
            notices,
        };

        let running = match spec {
            McpServerConfig::Stdio {
                command, args, env, ..
            } => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                for (key, value) in env {
                    cmd.env(key, value);
                }
                let transport =
                    TokioChildProcess::new(cmd).map_err(|e| McpError::ConnectionFailed {
                        server: name.to_owned(),
                        message: e.to_string(),
                    })?;
                handler
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        server: name.to_owned(),
                        message: e.to_string(),
                    })?
            },
            McpServerConfig::Sse { url, .. } => {
                let transport = SseClientTransport::start(url.clone()).await.map_err(|e| {
                    McpError::ConnectionFailed {
                        server: name.to_owned(),
                        message: e.to_string(),
                    }
                })?;
                handler
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        server: name.to_owned(),
                        message: e.to_string(),
                    })?
            },
            McpServerConfig::Http { url, .. } => {
                let transport = StreamableHttpClientTransport::from_uri(url.clone());
                handler
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        server: name.to_owned(),
                        message: e.to_string(),
                    })?
            },
        };

        info!(server = name, "MCP connection established");

        Ok(Arc::new(RmcpService {
            server: name.to_owned(),
            timeout: Duration::from_millis(spec.timeout_ms()),
            peer: running.peer().clone(),
            running: Mutex::new(Some(running)),
        }))
    }
}

/// Client handler that forwards server-driven notifications to the manager.
#[derive(Clone)]
struct NoticeHandler {
    server: String,
    notices: mpsc::UnboundedSender<ServerNotice>,
}

impl rmcp::ClientHandler for NoticeHandler {
    async fn on_tool_list_changed(
        &self,
        _context: rmcp::service::NotificationContext<RoleClient>,
    ) {
        debug!(server = %self.server, "Server reported tool list change");
        let _ = self.notices.send(ServerNotice::ToolsChanged {
            server: self.server.clone(),
        });
    }

    async fn on_resource_updated(
        &self,
        params: rmcp::model::ResourceUpdatedNotificationParam,
        _context: rmcp::service::NotificationContext<RoleClient>,
    ) {
        let _ = self.notices.send(ServerNotice::ResourceUpdated {
            server: self.server.clone(),
            uri: params.uri,
        });
    }
}

struct RmcpService {
    server: String,
    timeout: Duration,
    peer: Peer<RoleClient>,
    running: Mutex<Option<RunningService<RoleClient, NoticeHandler>>>,
}

impl RmcpService {
    fn transport_err(&self, e: impl std::fmt::Display) -> McpError {
        McpError::Transport {
            server: self.server.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl McpService for RmcpService {
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| self.transport_err(e))?;
        Ok(tools.iter().map(ToolDescriptor::from_rmcp).collect())
    }

    async fn list_prompts(&self) -> McpResult<Vec<PromptDescriptor>> {
        let prompts = self
            .peer
            .list_all_prompts()
            .await
            .map_err(|e| self.transport_err(e))?;
        Ok(prompts.iter().map(PromptDescriptor::from_rmcp).collect())
    }

    async fn list_resources(&self) -> McpResult<Vec<ResourceDescriptor>> {
        let resources = self
            .peer
            .list_all_resources()
            .await
            .map_err(|e| self.transport_err(e))?;
        Ok(resources
            .iter()
            .map(|r| ResourceDescriptor {
                uri: r.uri.to_string(),
                name: Some(r.name.to_string()),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        tool: &str,
        args: Value,
        cancel: &CancelToken,
    ) -> McpResult<McpToolResult> {
        let arguments = match args {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                // Wrap non-object values
                let mut map = serde_json::Map::new();
                map.insert("value".to_owned(), other);
                Some(map)
            },
        };

        let params = CallToolRequestParam {
            name: Cow::Owned(tool.to_owned()),
            arguments,
        };

        let call = self.peer.call_tool(params);
        let result = tokio::select! {
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(inner) => inner.map_err(|e| self.transport_err(e))?,
                Err(_) => {
                    return Err(McpError::Timeout {
                        server: self.server.clone(),
                        timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                },
            },
            () = cancel.cancelled() => {
                return Err(McpError::ToolAborted {
                    server: self.server.clone(),
                });
            },
        };

        Ok(McpToolResult::from(result))
    }

    async fn shutdown(&self) -> McpResult<()> {
        let running = {
            let mut guard = self.running.lock().await;
            guard.take()
        };
        if let Some(running) = running {
            running
                .cancel()
                .await
                .map_err(|e| self.transport_err(e))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RmcpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmcpService")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
