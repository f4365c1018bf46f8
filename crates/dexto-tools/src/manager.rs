//! The unified tool execution pipeline.

use dexto_approval::{ApprovalError, ApprovalManager};
use dexto_core::{CancelToken, SessionId};
use dexto_events::{AgentEvent, ApprovalStatus, EventBus};
use dexto_llm::{ToolCall, ToolDefinition};
use dexto_logger::Logger;
use dexto_mcp::McpManager;
use dexto_plugins::{PluginContext, PluginError, PluginManager, ToolResultPayload};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::truncate::truncate_output;
use crate::{InternalTool, ToolContext, ToolError, ToolRegistry};

/// Structured outcome of one tool invocation.
///
/// Failures are data: denial, timeout, cancellation, and execution errors
/// all come back with `is_error: true` so the model can react.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionResult {
    /// Result payload (string or structured).
    pub result: Value,
    /// Whether the result is an error.
    pub is_error: bool,
}

impl ToolExecutionResult {
    /// Successful result.
    #[must_use]
    pub fn ok(result: Value) -> Self {
        Self {
            result,
            is_error: false,
        }
    }

    /// Error result with a reason the model can read.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            result: Value::String(reason.into()),
            is_error: true,
        }
    }
}

/// Fronts internal and MCP tools behind one `execute` operation.
pub struct ToolManager {
    internal: ToolRegistry,
    mcp: Arc<McpManager>,
    approvals: Arc<ApprovalManager>,
    plugins: Arc<PluginManager>,
    bus: Arc<EventBus>,
    logger: Logger,
    workspace_root: PathBuf,
}

impl ToolManager {
    /// Create a tool manager.
    #[must_use]
    pub fn new(
        internal: ToolRegistry,
        mcp: Arc<McpManager>,
        approvals: Arc<ApprovalManager>,
        plugins: Arc<PluginManager>,
        bus: Arc<EventBus>,
        logger: Logger,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            internal,
            mcp,
            approvals,
            plugins,
            bus,
            logger: logger.child("tools", []),
            workspace_root,
        }
    }

    /// The approval manager this pipeline gates through.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalManager> {
        &self.approvals
    }

    /// The aggregated tool catalogue for the LLM: internal tools first,
    /// then non-shadowed MCP tools whose names are not taken by an
    /// internal tool.
    pub async fn catalogue(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.internal.definitions();
        for aggregated in self.mcp.visible_tools().await {
            if self.internal.contains(&aggregated.tool.name) {
                self.logger.warn(
                    "MCP tool shadowed by internal tool",
                    Some(json!({"tool": aggregated.tool.name, "server": aggregated.server})),
                );
                continue;
            }
            let mut definition = ToolDefinition::new(aggregated.tool.name.clone())
                .with_schema(aggregated.tool.input_schema.clone());
            if let Some(description) = aggregated.tool.description.clone() {
                definition = definition.with_description(description);
            }
            definitions.push(definition);
        }
        definitions
    }

    /// Execute one tool call.
    ///
    /// Pipeline: resolve → approval → `before_tool_call` plugins →
    /// dispatch → `after_tool_result` plugins → emit. Every failure mode
    /// except a blocking plugin failure is returned as an error *result*.
    ///
    /// Emits `dexto:toolCall` when dispatch begins and `dexto:toolResult`
    /// when the result is known.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] only: a blocking plugin failure aborts the
    /// surrounding run.
    pub async fn execute(
        &self,
        call: &ToolCall,
        session_id: Option<&SessionId>,
        cancel: &CancelToken,
        plugin_ctx: &PluginContext,
    ) -> Result<ToolExecutionResult, PluginError> {
        self.bus.publish(AgentEvent::ToolCall {
            session_id: plugin_ctx.session_id.clone(),
            call_id: call.id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
        });

        let result = self
            .execute_inner(call, session_id, cancel, plugin_ctx)
            .await?;

        self.bus.publish(AgentEvent::ToolResult {
            session_id: plugin_ctx.session_id.clone(),
            call_id: call.id.clone(),
            name: call.name.clone(),
            result: result.result.clone(),
            is_error: result.is_error,
        });

        Ok(result)
    }

    async fn execute_inner(
        &self,
        call: &ToolCall,
        session_id: Option<&SessionId>,
        cancel: &CancelToken,
        plugin_ctx: &PluginContext,
    ) -> Result<ToolExecutionResult, PluginError> {
        // Resolve internal-first, then MCP.
        if !self.internal.contains(&call.name) && self.mcp.find_tool(&call.name).await.is_err() {
            return Ok(ToolExecutionResult::error(format!(
                "tool not found: {}",
                call.name
            )));
        }

        // Approval gate. Internal filesystem tools flow through here like
        // everything else; policy lists apply on top.
        let outcome = match self
            .approvals
            .request_approval(session_id, &call.name, &call.args, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(ApprovalError::HandlerMissing) => {
                return Ok(ToolExecutionResult::error(
                    "approval unavailable: no handler registered",
                ));
            },
            Err(e) => return Ok(ToolExecutionResult::error(e.to_string())),
        };

        match outcome.status {
            ApprovalStatus::Approved => {},
            ApprovalStatus::Denied => {
                let reason = outcome
                    .reason
                    .unwrap_or_else(|| "denied".to_owned());
                return Ok(ToolExecutionResult::error(format!(
                    "tool call denied: {reason}"
                )));
            },
            ApprovalStatus::Cancelled => {
                return Ok(ToolExecutionResult::error("Cancelled"));
            },
            ApprovalStatus::TimedOut => {
                return Ok(ToolExecutionResult::error(
                    "tool call approval timed out",
                ));
            },
            ApprovalStatus::Pending => {
                // request_approval only returns terminal outcomes.
                return Ok(ToolExecutionResult::error("approval did not settle"));
            },
        }

        // Plugins may mutate args or short-circuit with a result.
        let (call, short_circuit) = self
            .plugins
            .before_tool_call(call.clone(), plugin_ctx)
            .await?;
        let raw = if let Some(short) = short_circuit {
            debug!(tool = %call.name, "Tool call short-circuited by plugin");
            ToolResultPayload {
                result: short.result,
                is_error: short.is_error,
            }
        } else {
            self.dispatch(&call, session_id, cancel).await
        };

        let finished = self
            .plugins
            .after_tool_result(&call, raw, plugin_ctx)
            .await?;

        Ok(ToolExecutionResult {
            result: finished.result,
            is_error: finished.is_error,
        })
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        session_id: Option<&SessionId>,
        cancel: &CancelToken,
    ) -> ToolResultPayload {
        if let Some(tool) = self.internal.get(&call.name).map(Arc::clone) {
            return self
                .dispatch_internal(tool.as_ref(), call, session_id, cancel)
                .await;
        }

        match self.mcp.find_tool(&call.name).await {
            Ok((server, _)) => {
                match self
                    .mcp
                    .call_tool(&server, &call.name, call.args.clone(), cancel)
                    .await
                {
                    Ok(result) => ToolResultPayload {
                        result: Value::String(truncate_output(result.content)),
                        is_error: result.is_error,
                    },
                    Err(dexto_mcp::McpError::ToolAborted { .. }) => ToolResultPayload {
                        result: Value::String("Cancelled".to_owned()),
                        is_error: true,
                    },
                    Err(e) => ToolResultPayload {
                        result: Value::String(e.to_string()),
                        is_error: true,
                    },
                }
            },
            Err(e) => ToolResultPayload {
                result: Value::String(e.to_string()),
                is_error: true,
            },
        }
    }

    async fn dispatch_internal(
        &self,
        tool: &dyn InternalTool,
        call: &ToolCall,
        session_id: Option<&SessionId>,
        cancel: &CancelToken,
    ) -> ToolResultPayload {
        let ctx = ToolContext {
            session_id: session_id.cloned(),
            workspace_root: self.workspace_root.clone(),
            approvals: Arc::clone(&self.approvals),
            cancel: cancel.clone(),
        };
        match tool.execute(call.args.clone(), &ctx).await {
            Ok(result) => ToolResultPayload {
                result,
                is_error: false,
            },
            Err(ToolError::Cancelled) => ToolResultPayload {
                result: Value::String("Cancelled".to_owned()),
                is_error: true,
            },
            Err(e) => ToolResultPayload {
                result: Value::String(e.to_string()),
                is_error: true,
            },
        }
    }
}

impl std::fmt::Debug for ToolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolManager")
            .field("internal", &self.internal)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CreateFilesTool;
    use async_trait::async_trait;
    use dexto_approval::{ApprovalMode, ApprovalPolicy};
    use dexto_config::McpServerConfig;
    use dexto_core::{AgentId, RetryConfig, ToolCallId};
    use dexto_logger::LogLevel;
    use dexto_mcp::{
        McpResult, McpService, McpServiceFactory, McpToolResult, PromptDescriptor,
        ResourceDescriptor, ServerNotice, ToolDescriptor,
    };
    use dexto_plugins::{Plugin, PluginEntry, ToolCallAction, ToolCallPayload};
    use std::sync::Weak;
    use tokio::sync::mpsc;

    struct EchoService;

    #[async_trait]
    impl McpService for EchoService {
        async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
            Ok(vec![ToolDescriptor::new("echo")])
        }
        async fn list_prompts(&self) -> McpResult<Vec<PromptDescriptor>> {
            Ok(Vec::new())
        }
        async fn list_resources(&self) -> McpResult<Vec<ResourceDescriptor>> {
            Ok(Vec::new())
        }
        async fn call_tool(
            &self,
            _tool: &str,
            args: Value,
            _cancel: &CancelToken,
        ) -> McpResult<McpToolResult> {
            Ok(McpToolResult::text(args.to_string()))
        }
        async fn shutdown(&self) -> McpResult<()> {
            Ok(())
        }
    }

    struct EchoFactory;

    #[async_trait]
    impl McpServiceFactory for EchoFactory {
        async fn connect(
            &self,
            _name: &str,
            _spec: &McpServerConfig,
            _notices: mpsc::UnboundedSender<ServerNotice>,
        ) -> McpResult<Arc<dyn McpService>> {
            Ok(Arc::new(EchoService))
        }
    }

    struct Fixture {
        manager: ToolManager,
        plugin_ctx: PluginContext,
        _dir: tempfile::TempDir,
    }

    async fn fixture(mode: ApprovalMode, plugins: PluginManager, with_mcp: bool) -> Fixture {
        let bus = Arc::new(EventBus::new());
        let logger = Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error);
        let approvals = Arc::new(ApprovalManager::new(
            ApprovalPolicy::with_mode(mode),
            Arc::clone(&bus),
            logger.clone(),
            Arc::new(dexto_storage::MemoryDatabase::new()),
            "test",
        ));
        let mcp = McpManager::new(
            Arc::new(EchoFactory),
            Arc::clone(&bus),
            logger.clone(),
            RetryConfig::default(),
        );
        if with_mcp {
            mcp.connect(
                "echo-server",
                McpServerConfig::Stdio {
                    command: "echo".to_owned(),
                    args: Vec::new(),
                    env: Default::default(),
                    timeout_ms: 1_000,
                    connection_mode: dexto_config::ConnectionMode::Strict,
                },
            )
            .await
            .unwrap();
        }

        let mut internal = ToolRegistry::new();
        internal.register(Arc::new(CreateFilesTool));

        let dir = tempfile::tempdir().unwrap();
        let manager = ToolManager::new(
            internal,
            mcp,
            approvals,
            Arc::new(plugins),
            Arc::clone(&bus),
            logger.clone(),
            dir.path().to_path_buf(),
        );
        let agent: Weak<dyn dexto_plugins::AgentFacade> = Weak::<Facade>::new();
        let plugin_ctx = PluginContext {
            session_id: SessionId::from("s1"),
            user_id: None,
            logger,
            event_bus: bus,
            agent,
        };
        Fixture {
            manager,
            plugin_ctx,
            _dir: dir,
        }
    }

    struct Facade;
    impl dexto_plugins::AgentFacade for Facade {
        fn agent_id(&self) -> AgentId {
            AgentId::new("test").unwrap()
        }
        fn event_bus(&self) -> Arc<EventBus> {
            Arc::new(EventBus::new())
        }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new(ToolCallId::new("c1"), name, args)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result_not_exception() {
        let fixture = fixture(ApprovalMode::AutoApprove, PluginManager::new(), false).await;
        let result = fixture
            .manager
            .execute(
                &call("ghost", json!({})),
                Some(&SessionId::from("s1")),
                &CancelToken::new(),
                &fixture.plugin_ctx,
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.result.as_str().unwrap().contains("tool not found"));
    }

    #[tokio::test]
    async fn test_auto_deny_produces_denial_result() {
        let fixture = fixture(ApprovalMode::AutoDeny, PluginManager::new(), false).await;
        let result = fixture
            .manager
            .execute(
                &call("create_files", json!({"files": [{"path": "x", "content": "y"}]})),
                Some(&SessionId::from("s1")),
                &CancelToken::new(),
                &fixture.plugin_ctx,
            )
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.result.as_str().unwrap().contains("denied"));
    }

    #[tokio::test]
    async fn test_internal_dispatch() {
        let fixture = fixture(ApprovalMode::AutoApprove, PluginManager::new(), false).await;
        let result = fixture
            .manager
            .execute(
                &call(
                    "create_files",
                    json!({"files": [{"path": "out.txt", "content": "done"}]}),
                ),
                Some(&SessionId::from("s1")),
                &CancelToken::new(),
                &fixture.plugin_ctx,
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(fixture._dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn test_mcp_dispatch() {
        let fixture = fixture(ApprovalMode::AutoApprove, PluginManager::new(), true).await;
        let result = fixture
            .manager
            .execute(
                &call("echo", json!({"v": 1})),
                Some(&SessionId::from("s1")),
                &CancelToken::new(),
                &fixture.plugin_ctx,
            )
            .await
            .unwrap();
        assert!(!result.is_error);
        assert!(result.result.as_str().unwrap().contains("\"v\":1"));
    }

    #[tokio::test]
    async fn test_catalogue_merges_internal_and_mcp() {
        let fixture = fixture(ApprovalMode::AutoApprove, PluginManager::new(), true).await;
        let names: Vec<String> = fixture
            .manager
            .catalogue()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert!(names.contains(&"create_files".to_owned()));
        assert!(names.contains(&"echo".to_owned()));
    }

    #[tokio::test]
    async fn test_plugin_short_circuit_skips_dispatch() {
        struct Cached;
        #[async_trait]
        impl Plugin for Cached {
            async fn before_tool_call(
                &self,
                _payload: &ToolCallPayload,
                _ctx: &PluginContext,
            ) -> Result<ToolCallAction, String> {
                Ok(ToolCallAction {
                    call: None,
                    short_circuit: Some(ToolResultPayload {
                        result: json!("from cache"),
                        is_error: false,
                    }),
                })
            }
        }

        let mut plugins = PluginManager::new();
        plugins
            .register(PluginEntry::new("cache", Arc::new(Cached)).blocking())
            .unwrap();
        let fixture = fixture(ApprovalMode::AutoApprove, plugins, false).await;

        let result = fixture
            .manager
            .execute(
                &call("create_files", json!({"files": [{"path": "x.txt", "content": "y"}]})),
                Some(&SessionId::from("s1")),
                &CancelToken::new(),
                &fixture.plugin_ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.result, json!("from cache"));
        assert!(!fixture._dir.path().join("x.txt").exists());
    }

    #[tokio::test]
    async fn test_blocking_plugin_failure_aborts() {
        struct Broken;
        #[async_trait]
        impl Plugin for Broken {
            async fn before_tool_call(
                &self,
                _payload: &ToolCallPayload,
                _ctx: &PluginContext,
            ) -> Result<ToolCallAction, String> {
                Err("policy refused".to_owned())
            }
        }

        let mut plugins = PluginManager::new();
        plugins
            .register(PluginEntry::new("broken", Arc::new(Broken)).blocking())
            .unwrap();
        let fixture = fixture(ApprovalMode::AutoApprove, plugins, false).await;

        let result = fixture
            .manager
            .execute(
                &call("create_files", json!({"files": [{"path": "x.txt", "content": "y"}]})),
                Some(&SessionId::from("s1")),
                &CancelToken::new(),
                &fixture.plugin_ctx,
            )
            .await;
        assert!(matches!(result, Err(PluginError::Blocking { .. })));
    }

    #[tokio::test]
    async fn test_call_and_result_events_emitted() {
        let fixture = fixture(ApprovalMode::AutoApprove, PluginManager::new(), false).await;
        let mut receiver = fixture.plugin_ctx.event_bus.subscribe();

        fixture
            .manager
            .execute(
                &call("ghost", json!({})),
                Some(&SessionId::from("s1")),
                &CancelToken::new(),
                &fixture.plugin_ctx,
            )
            .await
            .unwrap();

        assert_eq!(receiver.recv().await.unwrap().topic(), "dexto:toolCall");
        assert_eq!(receiver.recv().await.unwrap().topic(), "dexto:toolResult");
    }
}
