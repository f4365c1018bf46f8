//! The MCP connection manager.

use dashmap::DashMap;
use dexto_config::{ConnectionMode, McpServerConfig};
use dexto_core::{CancelToken, RetryConfig};
use dexto_events::{AgentEvent, EventBus};
use dexto_logger::Logger;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::error::{McpError, McpResult};
use crate::service::{McpService, McpServiceFactory, ServerNotice};
use crate::types::{AggregatedTool, McpToolResult, PromptDescriptor, ResourceDescriptor, ToolDescriptor};

/// Per-connection state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connection attempt in progress.
    Connecting,
    /// Live.
    Connected,
    /// Transport failed; lenient connections are backing off to reconnect.
    Error,
    /// Explicitly disconnected. Terminal.
    Disconnected,
}

/// Introspection snapshot of one connection.
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Server name.
    pub name: String,
    /// Current state.
    pub status: ConnectionStatus,
    /// Number of tools currently cached.
    pub tool_count: usize,
    /// Last transport error, when one occurred.
    pub last_error: Option<String>,
}

struct Connection {
    spec: McpServerConfig,
    seq: u64,
    status: RwLock<ConnectionStatus>,
    service: RwLock<Option<Arc<dyn McpService>>>,
    tools: RwLock<Vec<ToolDescriptor>>,
    prompts: RwLock<Vec<PromptDescriptor>>,
    resources: RwLock<Vec<ResourceDescriptor>>,
    last_error: RwLock<Option<String>>,
    /// Fired on disconnect; aborts in-flight calls and the reconnect loop.
    abort: CancelToken,
}

/// Maintains named MCP connections and their aggregated capabilities.
pub struct McpManager {
    factory: Arc<dyn McpServiceFactory>,
    connections: DashMap<String, Arc<Connection>>,
    bus: Arc<EventBus>,
    logger: Logger,
    retry: RetryConfig,
    seq: AtomicU64,
    notice_tx: mpsc::UnboundedSender<ServerNotice>,
}

impl McpManager {
    /// Create a manager and start its notification listener.
    #[must_use]
    pub fn new(
        factory: Arc<dyn McpServiceFactory>,
        bus: Arc<EventBus>,
        logger: Logger,
        retry: RetryConfig,
    ) -> Arc<Self> {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            factory,
            connections: DashMap::new(),
            bus,
            logger: logger.child("mcp", []),
            retry,
            seq: AtomicU64::new(0),
            notice_tx,
        });
        Self::spawn_notice_listener(Arc::downgrade(&manager), notice_rx);
        manager
    }

    /// Process server-driven notifications until the manager is dropped.
    fn spawn_notice_listener(
        manager: std::sync::Weak<Self>,
        mut rx: mpsc::UnboundedReceiver<ServerNotice>,
    ) {
        tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                match notice {
                    ServerNotice::ToolsChanged { server } => {
                        if let Err(e) = manager.refresh_capabilities(&server).await {
                            warn!(server = %server, error = %e, "Capability refresh failed");
                        } else {
                            info!(server = %server, "Tools refreshed from server notification");
                        }
                    },
                    ServerNotice::ResourceUpdated { uri, .. } => {
                        manager.bus.publish(AgentEvent::ResourceUpdated { uri });
                    },
                }
            }
        });
    }

    /// Connect a named server.
    ///
    /// Idempotent: repeated calls with the same name and an equal spec are
    /// no-ops. A different spec disconnects the old connection first.
    ///
    /// Failure handling follows the configured `connection_mode`: `strict`
    /// propagates the failure; `lenient` leaves the connection in `Error`
    /// and schedules backoff reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ConnectionFailed`] when a strict connection
    /// cannot be established.
    pub async fn connect(self: &Arc<Self>, name: &str, spec: McpServerConfig) -> McpResult<()> {
        if let Some(existing) = self.connections.get(name).map(|e| Arc::clone(e.value())) {
            let status = *existing.status.read().await;
            if existing.spec == spec && status != ConnectionStatus::Disconnected {
                debug!(server = name, "Connect is a no-op (same spec)");
                return Ok(());
            }
            // Different spec (or terminal state): tear down and reconnect.
            self.disconnect(name).await?;
        }

        let connection = Arc::new(Connection {
            spec: spec.clone(),
            seq: self.seq.fetch_add(1, Ordering::AcqRel),
            status: RwLock::new(ConnectionStatus::Connecting),
            service: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            prompts: RwLock::new(Vec::new()),
            resources: RwLock::new(Vec::new()),
            last_error: RwLock::new(None),
            abort: CancelToken::new(),
        });
        self.connections
            .insert(name.to_owned(), Arc::clone(&connection));

        match self
            .factory
            .connect(name, &spec, self.notice_tx.clone())
            .await
        {
            Ok(service) => {
                *connection.service.write().await = Some(service);
                *connection.status.write().await = ConnectionStatus::Connected;
                if let Err(e) = self.refresh_capabilities(name).await {
                    // The transport died between handshake and first list.
                    *connection.status.write().await = ConnectionStatus::Error;
                    *connection.last_error.write().await = Some(e.to_string());
                    return match spec.connection_mode() {
                        ConnectionMode::Strict => Err(e),
                        ConnectionMode::Lenient => {
                            self.spawn_reconnect(name.to_owned(), connection);
                            Ok(())
                        },
                    };
                }
                let tool_count = connection.tools.read().await.len();
                self.bus.publish(AgentEvent::McpServerConnected {
                    name: name.to_owned(),
                    tool_count,
                });
                self.warn_conflicts().await;
                Ok(())
            },
            Err(e) => {
                *connection.status.write().await = ConnectionStatus::Error;
                *connection.last_error.write().await = Some(e.to_string());
                match spec.connection_mode() {
                    ConnectionMode::Strict => Err(e),
                    ConnectionMode::Lenient => {
                        self.logger.warn(
                            "MCP connect failed, scheduling reconnect",
                            Some(json!({"server": name, "error": e.to_string()})),
                        );
                        self.spawn_reconnect(name.to_owned(), connection);
                        Ok(())
                    },
                }
            },
        }
    }

    /// Backoff reconnect loop for lenient connections.
    fn spawn_reconnect(self: &Arc<Self>, name: String, connection: Arc<Connection>) {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut schedule = {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                manager.retry.schedule()
            };
            loop {
                let Some(delay) = schedule.next() else {
                    return;
                };
                tokio::select! {
                    () = tokio::time::sleep(delay) => {},
                    () = connection.abort.cancelled() => return,
                }
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                debug!(server = %name, attempt = schedule.attempts(), "Reconnecting MCP server");
                match manager
                    .factory
                    .connect(&name, &connection.spec, manager.notice_tx.clone())
                    .await
                {
                    Ok(service) => {
                        *connection.service.write().await = Some(service);
                        *connection.status.write().await = ConnectionStatus::Connected;
                        *connection.last_error.write().await = None;
                        let _ = manager.refresh_capabilities(&name).await;
                        let tool_count = connection.tools.read().await.len();
                        manager.bus.publish(AgentEvent::McpServerConnected {
                            name: name.clone(),
                            tool_count,
                        });
                        return;
                    },
                    Err(e) => {
                        *connection.last_error.write().await = Some(e.to_string());
                    },
                }
            }
        });
    }

    /// Disconnect a named server.
    ///
    /// Pending calls are aborted with [`McpError::ToolAborted`]; the
    /// connection reaches the terminal `Disconnected` state.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ServerNotFound`] for unknown names.
    pub async fn disconnect(&self, name: &str) -> McpResult<()> {
        let Some((_, connection)) = self.connections.remove(name) else {
            return Err(McpError::ServerNotFound(name.to_owned()));
        };
        connection.abort.cancel();
        *connection.status.write().await = ConnectionStatus::Disconnected;
        let service = connection.service.write().await.take();
        if let Some(service) = service {
            if let Err(e) = service.shutdown().await {
                warn!(server = name, error = %e, "MCP shutdown reported an error");
            }
        }
        self.bus.publish(AgentEvent::McpServerDisconnected {
            name: name.to_owned(),
        });
        Ok(())
    }

    /// Disconnect every server (agent stop).
    pub async fn disconnect_all(&self) {
        let names: Vec<String> = self
            .connections
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for name in names {
            let _ = self.disconnect(&name).await;
        }
    }

    /// Re-list a server's capabilities into its caches.
    async fn refresh_capabilities(&self, name: &str) -> McpResult<()> {
        let connection = self
            .connections
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| McpError::ServerNotFound(name.to_owned()))?;
        let service = {
            let guard = connection.service.read().await;
            guard.as_ref().map(Arc::clone)
        };
        let Some(service) = service else {
            return Ok(());
        };

        let tools = service.list_tools().await?;
        let prompts = service.list_prompts().await.unwrap_or_default();
        let resources = service.list_resources().await.unwrap_or_default();

        *connection.tools.write().await = tools;
        *connection.prompts.write().await = prompts;
        *connection.resources.write().await = resources;
        Ok(())
    }

    /// Log one warning per shadowed tool.
    async fn warn_conflicts(&self) {
        for tool in self.list_tools().await {
            if tool.shadowed {
                self.logger.warn(
                    "Tool name conflict, later server shadowed",
                    Some(json!({"tool": tool.tool.name, "server": tool.server})),
                );
            }
        }
    }

    /// The aggregated tool namespace.
    ///
    /// Ordered by connect sequence; when two servers expose the same tool
    /// name, the earlier-connecting server wins and the later entry is
    /// marked `shadowed`.
    pub async fn list_tools(&self) -> Vec<AggregatedTool> {
        let mut connections: Vec<(String, Arc<Connection>)> = self
            .connections
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        connections.sort_by_key(|(_, c)| c.seq);

        let mut seen = std::collections::HashSet::new();
        let mut aggregated = Vec::new();
        for (server, connection) in connections {
            if *connection.status.read().await != ConnectionStatus::Connected {
                continue;
            }
            for tool in connection.tools.read().await.iter() {
                let shadowed = !seen.insert(tool.name.clone());
                aggregated.push(AggregatedTool {
                    server: server.clone(),
                    tool: tool.clone(),
                    shadowed,
                });
            }
        }
        aggregated
    }

    /// Visible (non-shadowed) tools only.
    pub async fn visible_tools(&self) -> Vec<AggregatedTool> {
        self.list_tools()
            .await
            .into_iter()
            .filter(|t| !t.shadowed)
            .collect()
    }

    /// Union of all connected servers' prompts.
    pub async fn list_prompts(&self) -> Vec<PromptDescriptor> {
        let connections: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        let mut prompts = Vec::new();
        for connection in connections {
            prompts.extend(connection.prompts.read().await.iter().cloned());
        }
        prompts
    }

    /// Union of all connected servers' resources.
    pub async fn list_resources(&self) -> Vec<ResourceDescriptor> {
        let connections: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        let mut resources = Vec::new();
        for connection in connections {
            resources.extend(connection.resources.read().await.iter().cloned());
        }
        resources
    }

    /// Find the owning server for a tool name in the visible namespace.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ToolNotFound`] when no connected server exposes
    /// the name.
    pub async fn find_tool(&self, tool: &str) -> McpResult<(String, ToolDescriptor)> {
        self.visible_tools()
            .await
            .into_iter()
            .find(|t| t.tool.name == tool)
            .map(|t| (t.server, t.tool))
            .ok_or_else(|| McpError::ToolNotFound(tool.to_owned()))
    }

    /// Call a tool on a named server.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ServerNotFound`] for unknown servers,
    /// [`McpError::StrictModeAborted`] when a strict connection is in the
    /// error state, [`McpError::Transport`] on connection loss,
    /// [`McpError::ToolAborted`] on cancellation or disconnect, and
    /// [`McpError::Timeout`] on deadline expiry.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
        cancel: &CancelToken,
    ) -> McpResult<McpToolResult> {
        let connection = self
            .connections
            .get(server)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| McpError::ServerNotFound(server.to_owned()))?;

        match *connection.status.read().await {
            ConnectionStatus::Connected => {},
            ConnectionStatus::Error => {
                return match connection.spec.connection_mode() {
                    ConnectionMode::Strict => Err(McpError::StrictModeAborted {
                        server: server.to_owned(),
                    }),
                    ConnectionMode::Lenient => Err(McpError::Transport {
                        server: server.to_owned(),
                        message: "connection lost, reconnect in progress".to_owned(),
                    }),
                };
            },
            ConnectionStatus::Connecting | ConnectionStatus::Disconnected => {
                return Err(McpError::Transport {
                    server: server.to_owned(),
                    message: "server not connected".to_owned(),
                });
            },
        }

        let service = {
            let guard = connection.service.read().await;
            guard.as_ref().map(Arc::clone)
        }
        .ok_or_else(|| McpError::Transport {
            server: server.to_owned(),
            message: "server not connected".to_owned(),
        })?;

        debug!(server, tool, "Calling MCP tool");

        let result = tokio::select! {
            result = service.call_tool(tool, args, cancel) => result,
            () = connection.abort.cancelled() => Err(McpError::ToolAborted {
                server: server.to_owned(),
            }),
        };

        if let Err(McpError::Transport { .. }) = &result {
            *connection.status.write().await = ConnectionStatus::Error;
            if connection.spec.connection_mode() == ConnectionMode::Lenient {
                warn!(server, "Transport failure, connection marked errored");
            }
        }

        result
    }

    /// Snapshot of every connection, for introspection.
    pub async fn snapshot(&self) -> Vec<ServerSnapshot> {
        let connections: Vec<(String, Arc<Connection>)> = self
            .connections
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut snapshots = Vec::new();
        for (name, connection) in connections {
            snapshots.push(ServerSnapshot {
                name,
                status: *connection.status.read().await,
                tool_count: connection.tools.read().await.len(),
                last_error: connection.last_error.read().await.clone(),
            });
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Current status of one connection.
    pub async fn status(&self, name: &str) -> Option<ConnectionStatus> {
        let connection = self.connections.get(name).map(|e| Arc::clone(e.value()))?;
        let status = *connection.status.read().await;
        Some(status)
    }

    /// Number of registered connections (any state).
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}
