//! The public agent facade: lifecycle, reload, and mutation operations.

use dexto_approval::{ApprovalHandler, ApprovalManager, ApprovalMode, ApprovalPolicy, CacheStorage};
use dexto_config::{
    AgentConfig, AllowedToolsStorage, ConfigChange, DataSourceConfig, InternalToolName, LlmConfig,
    McpServerConfig, ToolConfirmationMode,
};
use dexto_core::{AgentId, RetryConfig, SessionId};
use dexto_events::{AgentEvent, EventBus};
use dexto_llm::LlmClient;
use dexto_logger::{LogLevel, Logger};
use dexto_mcp::{McpManager, McpServiceFactory, RmcpServiceFactory};
use dexto_plugins::{AgentFacade, PluginContext, PluginEntry, PluginManager};
use dexto_resources::{CompositeLoader, FsLoader, HttpLoader};
use dexto_storage::StorageFactory;
use dexto_tools::{
    AskUserTool, CreateFilesTool, EditFileTool, ToolManager, ToolRegistry,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::prompt::SystemPromptComposer;
use crate::services::{LlmLimits, SessionServices};
use crate::sessions::SessionManager;
use crate::state::{QueuedMessage, RunOutcome};
use crate::store::SessionStore;

/// Agent lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    /// Constructed, not started.
    Stopped,
    /// `start()` in progress.
    Starting,
    /// Serving.
    Running,
    /// `stop()` in progress.
    Stopping,
    /// `reload()` in progress.
    Reloading,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Reloading => "reloading",
        };
        f.write_str(s)
    }
}

/// What `reload` did.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    /// Whether a full restart was required.
    pub restarted: bool,
    /// The config groups that changed.
    pub changes_applied: Vec<ConfigChange>,
}

struct RuntimeServices {
    services: Arc<SessionServices>,
    sessions: Arc<SessionManager>,
}

/// Builder for [`DextoAgent`].
///
/// Construction validates the config and wires collaborators; no network
/// connection is opened until `start()`.
pub struct DextoAgentBuilder {
    config: AgentConfig,
    llm_client: Option<Arc<dyn LlmClient>>,
    mcp_factory: Option<Arc<dyn McpServiceFactory>>,
    storage_factory: StorageFactory,
    resource_loader: Option<Arc<CompositeLoader>>,
    logger: Option<Logger>,
    config_source: Option<String>,
    workspace_root: PathBuf,
}

impl DextoAgentBuilder {
    /// Start building an agent from a validated config.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            llm_client: None,
            mcp_factory: None,
            storage_factory: StorageFactory::new(),
            resource_loader: None,
            logger: None,
            config_source: None,
            workspace_root: PathBuf::from("."),
        }
    }

    /// The LLM client (required). Provider construction is the
    /// enrichment layer's job; the core accepts the finished instance.
    #[must_use]
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    /// Override the MCP transport factory (tests use in-process fakes).
    #[must_use]
    pub fn with_mcp_factory(mut self, factory: Arc<dyn McpServiceFactory>) -> Self {
        self.mcp_factory = Some(factory);
        self
    }

    /// Override the storage factory (installs remote backend builders).
    #[must_use]
    pub fn with_storage_factory(mut self, factory: StorageFactory) -> Self {
        self.storage_factory = factory;
        self
    }

    /// Override the resource loader stack.
    #[must_use]
    pub fn with_resource_loader(mut self, loader: Arc<CompositeLoader>) -> Self {
        self.resource_loader = Some(loader);
        self
    }

    /// Inject a logger (defaults to a tracing-backed one).
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// URI to reload the config from when `reload(None)` is called.
    #[must_use]
    pub fn with_config_source(mut self, uri: impl Into<String>) -> Self {
        self.config_source = Some(uri.into());
        self
    }

    /// Workspace root for filesystem-touching internal tools.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Validate and construct the agent.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] for invalid configuration and
    /// [`RuntimeError::Lifecycle`] when no LLM client was supplied.
    pub fn build(self) -> RuntimeResult<Arc<DextoAgent>> {
        let agent_id = self.config.validate()?;
        let Some(llm_client) = self.llm_client else {
            return Err(RuntimeError::Lifecycle {
                operation: "build",
                actual: "no LLM client supplied".to_owned(),
            });
        };
        let level: LogLevel = self
            .config
            .logger
            .level
            .parse()
            .unwrap_or(LogLevel::Info);
        let logger = self
            .logger
            .unwrap_or_else(|| Logger::tracing_only(agent_id.clone(), level));
        let resource_loader = self.resource_loader.unwrap_or_else(|| {
            Arc::new(CompositeLoader::new(vec![
                Arc::new(FsLoader::new()),
                Arc::new(HttpLoader::new()),
            ]))
        });

        Ok(Arc::new(DextoAgent {
            agent_id,
            config: RwLock::new(self.config),
            config_source: self.config_source,
            status: RwLock::new(AgentStatus::Stopped),
            bus: Arc::new(EventBus::new()),
            logger,
            lifecycle: tokio::sync::Mutex::new(()),
            llm_client: RwLock::new(llm_client),
            mcp_factory: self
                .mcp_factory
                .unwrap_or_else(|| Arc::new(RmcpServiceFactory::new())),
            storage_factory: self.storage_factory,
            resource_loader,
            handler: RwLock::new(None),
            plugin_entries: std::sync::Mutex::new(Vec::new()),
            runtime: RwLock::new(None),
            workspace_root: self.workspace_root,
        }))
    }
}

/// The process-wide agent: owns the services and the lifecycle.
pub struct DextoAgent {
    agent_id: AgentId,
    config: RwLock<AgentConfig>,
    config_source: Option<String>,
    status: RwLock<AgentStatus>,
    bus: Arc<EventBus>,
    logger: Logger,
    /// Serializes `start`, `stop`, `restart`, `reload`, and `switch_llm`.
    lifecycle: tokio::sync::Mutex<()>,
    llm_client: RwLock<Arc<dyn LlmClient>>,
    mcp_factory: Arc<dyn McpServiceFactory>,
    storage_factory: StorageFactory,
    resource_loader: Arc<CompositeLoader>,
    handler: RwLock<Option<Arc<dyn ApprovalHandler>>>,
    plugin_entries: std::sync::Mutex<Vec<PluginEntry>>,
    runtime: RwLock<Option<RuntimeServices>>,
    workspace_root: PathBuf,
}

impl AgentFacade for DextoAgent {
    fn agent_id(&self) -> AgentId {
        self.agent_id.clone()
    }

    fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }
}

impl DextoAgent {
    /// Start building an agent.
    #[must_use]
    pub fn builder(config: AgentConfig) -> DextoAgentBuilder {
        DextoAgentBuilder::new(config)
    }

    /// The agent id.
    #[must_use]
    pub fn id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> AgentStatus {
        *self.status.read().await
    }

    /// The event bus, for transports to subscribe.
    #[must_use]
    pub fn agent_event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Register the approval handler. Takes effect immediately when
    /// running, and is carried into the next `start()` otherwise.
    pub async fn set_approval_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        *self.handler.write().await = Some(Arc::clone(&handler));
        if let Some(runtime) = &*self.runtime.read().await {
            runtime.services.approvals.set_handler(handler).await;
        }
    }

    /// Remove the approval handler.
    pub async fn clear_approval_handler(&self) {
        *self.handler.write().await = None;
        if let Some(runtime) = &*self.runtime.read().await {
            runtime.services.approvals.clear_handler().await;
        }
    }

    /// Register a plugin instance. Applied at the next `start()`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Lifecycle`] while the agent is running;
    /// the hook chain is rebuilt only across a restart.
    pub async fn register_plugin(&self, entry: PluginEntry) -> RuntimeResult<()> {
        if *self.status.read().await == AgentStatus::Running {
            return Err(RuntimeError::Lifecycle {
                operation: "register_plugin",
                actual: "running".to_owned(),
            });
        }
        self.plugin_entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the agent: resolve storage, build services, connect MCP
    /// servers, start sweepers.
    ///
    /// # Errors
    ///
    /// Fails fast with [`RuntimeError::Approval`] when the approval mode
    /// is manual and no handler is registered, before any MCP connection
    /// is opened. Also propagates storage and strict-MCP failures.
    pub async fn start(self: &Arc<Self>) -> RuntimeResult<()> {
        let _guard = self.lifecycle.lock().await;
        self.start_inner().await
    }

    /// Stop the agent: cancel runs, close connections, flush state.
    /// Idempotent.
    pub async fn stop(self: &Arc<Self>) -> RuntimeResult<()> {
        let _guard = self.lifecycle.lock().await;
        self.stop_inner(None).await
    }

    /// `stop()` then `start()` under one lifecycle lock.
    ///
    /// # Errors
    ///
    /// Propagates `start` failures.
    pub async fn restart(self: &Arc<Self>) -> RuntimeResult<()> {
        let _guard = self.lifecycle.lock().await;
        self.stop_inner(Some("restart")).await?;
        self.start_inner().await
    }

    async fn start_inner(self: &Arc<Self>) -> RuntimeResult<()> {
        {
            let status = *self.status.read().await;
            if status == AgentStatus::Running {
                return Ok(());
            }
            if status != AgentStatus::Stopped {
                return Err(RuntimeError::Lifecycle {
                    operation: "start",
                    actual: status.to_string(),
                });
            }
        }
        *self.status.write().await = AgentStatus::Starting;

        let result = self.build_runtime().await;
        match result {
            Ok(runtime) => {
                *self.runtime.write().await = Some(runtime);
                *self.status.write().await = AgentStatus::Running;
                self.bus.publish(AgentEvent::AgentStarted {
                    agent_id: self.agent_id.clone(),
                });
                info!(agent_id = %self.agent_id, "Agent started");
                Ok(())
            },
            Err(e) => {
                *self.status.write().await = AgentStatus::Stopped;
                Err(e)
            },
        }
    }

    async fn build_runtime(self: &Arc<Self>) -> RuntimeResult<RuntimeServices> {
        let config = self.config.read().await.clone();

        // Startup safety: manual mode needs a handler before anything
        // outward-facing happens.
        let handler = self.handler.read().await.clone();
        if config.tool_confirmation.mode == ToolConfirmationMode::Manual && handler.is_none() {
            return Err(dexto_approval::ApprovalError::HandlerMissing.into());
        }

        let storage = self.storage_factory.build(&config.storage, &self.logger)?;
        let store = SessionStore::new(Arc::clone(&storage.database));

        let approvals = Arc::new(ApprovalManager::new(
            approval_policy_from(&config),
            Arc::clone(&self.bus),
            self.logger.clone(),
            Arc::clone(&storage.database),
            self.agent_id.as_str(),
        ));
        if let Some(handler) = handler {
            approvals.set_handler(handler).await;
        }

        let mcp = McpManager::new(
            Arc::clone(&self.mcp_factory),
            Arc::clone(&self.bus),
            self.logger.clone(),
            RetryConfig::default(),
        );

        let plugins = Arc::new(self.build_plugins(&config));
        let internal = build_internal_tools(&config);
        let tools = Arc::new(ToolManager::new(
            internal,
            Arc::clone(&mcp),
            Arc::clone(&approvals),
            Arc::clone(&plugins),
            Arc::clone(&self.bus),
            self.logger.clone(),
            self.workspace_root.clone(),
        ));

        let prompt = SystemPromptComposer::new(
            config.system_prompt.clone(),
            config.data_sources.clone(),
            Arc::clone(&self.resource_loader),
            self.logger.clone(),
        );

        let placeholder: Weak<dyn AgentFacade> = Weak::<Self>::new();
        let services = Arc::new(SessionServices {
            llm: RwLock::new(Arc::clone(&*self.llm_client.read().await)),
            llm_limits: RwLock::new(limits_from(&config.llm)),
            tools,
            plugins: Arc::clone(&plugins),
            approvals: Arc::clone(&approvals),
            mcp: Arc::clone(&mcp),
            bus: Arc::clone(&self.bus),
            logger: self.logger.clone(),
            store,
            prompt: RwLock::new(prompt),
            session_config: config.sessions,
            agent: RwLock::new(placeholder),
        });
        {
            let weak: Weak<dyn AgentFacade> = Arc::downgrade(&(Arc::clone(self) as Arc<dyn AgentFacade>));
            *services.agent.write().await = weak;
        }

        let sessions = SessionManager::new(Arc::clone(&services));
        sessions.start_sweeper();

        // Connect configured MCP servers. Strict failures abort start and
        // roll back what was opened so far.
        for (name, spec) in &config.mcp_servers {
            if let Err(e) = mcp.connect(name, spec.clone()).await {
                mcp.disconnect_all().await;
                sessions.stop_sweeper();
                return Err(e.into());
            }
        }

        let agent: Weak<dyn AgentFacade> = Arc::downgrade(&(Arc::clone(self) as Arc<dyn AgentFacade>));
        let ctx = PluginContext {
            session_id: SessionId::from("__agent__"),
            user_id: None,
            logger: self.logger.clone(),
            event_bus: Arc::clone(&self.bus),
            agent,
        };
        plugins.initialize_all(&ctx).await?;

        Ok(RuntimeServices { services, sessions })
    }

    fn build_plugins(&self, config: &AgentConfig) -> PluginManager {
        let mut manager = PluginManager::new();
        // Clone the registrations; the originals stay for later restarts.
        let entries: Vec<PluginEntry> = {
            let guard = self
                .plugin_entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.iter().map(clone_entry).collect()
        };
        for mut entry in entries {
            // Config entries with the same name refine registered
            // instances (enabled/blocking/priority/config).
            if let Some(cfg) = config.plugins.custom.iter().find(|c| c.name == entry.name) {
                entry.enabled = cfg.enabled;
                entry.blocking = cfg.blocking;
                entry.priority = cfg.priority;
                if entry.config.is_none() {
                    entry.config = cfg.config.clone();
                }
            }
            if let Err(e) = manager.register(entry) {
                warn!(error = %e, "Skipping plugin registration");
            }
        }
        for cfg in &config.plugins.custom {
            if manager.names().contains(&cfg.name.as_str()) {
                continue;
            }
            // Module-ref entries need the enrichment layer to resolve an
            // instance; the core cannot load modules.
            warn!(
                plugin = %cfg.name,
                "Plugin configured by module reference but no instance registered; skipping"
            );
        }
        manager
    }

    async fn stop_inner(self: &Arc<Self>, reason: Option<&str>) -> RuntimeResult<()> {
        {
            let status = *self.status.read().await;
            if status == AgentStatus::Stopped {
                return Ok(());
            }
        }
        *self.status.write().await = AgentStatus::Stopping;

        if let Some(runtime) = self.runtime.write().await.take() {
            runtime.sessions.cancel_all().await;
            runtime.services.approvals.cancel_all();
            runtime.sessions.stop_sweeper();

            let agent: Weak<dyn AgentFacade> = Arc::downgrade(&(Arc::clone(self) as Arc<dyn AgentFacade>));
            let ctx = PluginContext {
                session_id: SessionId::from("__agent__"),
                user_id: None,
                logger: self.logger.clone(),
                event_bus: Arc::clone(&self.bus),
                agent,
            };
            runtime.services.plugins.cleanup_all(&ctx).await;
            runtime.services.mcp.disconnect_all().await;
        }

        *self.status.write().await = AgentStatus::Stopped;
        self.bus.publish(AgentEvent::AgentStopped {
            agent_id: self.agent_id.clone(),
            reason: reason.map(str::to_owned),
        });
        info!(agent_id = %self.agent_id, "Agent stopped");
        Ok(())
    }

    /// Reload configuration.
    ///
    /// With `new_config` omitted, the config is fetched from the
    /// configured source through the resource loader. Structural changes
    /// (LLM, storage, MCP set, approval mode) restart the agent; the rest
    /// hot-applies.
    ///
    /// # Errors
    ///
    /// Propagates validation, load, and restart failures.
    pub async fn reload(self: &Arc<Self>, new_config: Option<AgentConfig>) -> RuntimeResult<ReloadReport> {
        let _guard = self.lifecycle.lock().await;

        let new_config = match new_config {
            Some(config) => config,
            None => self.load_config_from_source().await?,
        };
        new_config.validate()?;

        let diff = { self.config.read().await.diff(&new_config) };
        if diff.is_empty() {
            return Ok(ReloadReport {
                restarted: false,
                changes_applied: Vec::new(),
            });
        }

        let was_running = *self.status.read().await == AgentStatus::Running;
        let changes = diff.changes.clone();

        if !was_running {
            // Not serving: adopt the config; it takes effect at start().
            *self.config.write().await = new_config;
            return Ok(ReloadReport {
                restarted: false,
                changes_applied: changes,
            });
        }

        *self.status.write().await = AgentStatus::Reloading;

        if diff.requires_restart() {
            *self.config.write().await = new_config;
            self.stop_inner(Some("reload")).await?;
            self.start_inner().await?;
            return Ok(ReloadReport {
                restarted: true,
                changes_applied: changes,
            });
        }

        // Hot-apply.
        if let Some(runtime) = &*self.runtime.read().await {
            if changes.contains(&ConfigChange::ToolPolicies) {
                runtime
                    .services
                    .approvals
                    .set_policy(approval_policy_from(&new_config))
                    .await?;
            }
            if changes.contains(&ConfigChange::SystemPrompt) {
                runtime
                    .services
                    .prompt
                    .write()
                    .await
                    .set_config(new_config.system_prompt.clone());
            }
        }
        *self.config.write().await = new_config;
        *self.status.write().await = AgentStatus::Running;

        self.logger.info(
            "Config hot-applied",
            Some(json!({"changes": changes.len()})),
        );
        Ok(ReloadReport {
            restarted: false,
            changes_applied: changes,
        })
    }

    async fn load_config_from_source(&self) -> RuntimeResult<AgentConfig> {
        let Some(source_uri) = &self.config_source else {
            return Err(RuntimeError::Lifecycle {
                operation: "reload",
                actual: "no config source registered".to_owned(),
            });
        };
        let source = data_source_for_uri(source_uri);
        let content = self.resource_loader.load(source_uri, &source).await?;
        let config: AgentConfig = serde_json::from_str(&content.into_text()).map_err(|e| {
            RuntimeError::Config(dexto_config::ConfigError::InvalidUri {
                uri: source_uri.clone(),
                reason: e.to_string(),
            })
        })?;
        Ok(config)
    }

    /// Swap the LLM client.
    ///
    /// Without `force`, any session with an active run fails the switch
    /// with [`RuntimeError::BusyRun`]. With `force`, active runs are
    /// cancelled first; queued messages continue with the new client.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::BusyRun`] as above and
    /// [`RuntimeError::Lifecycle`] when the agent is not running.
    pub async fn switch_llm(
        self: &Arc<Self>,
        client: Arc<dyn LlmClient>,
        llm_config: Option<LlmConfig>,
        force: bool,
    ) -> RuntimeResult<()> {
        let _guard = self.lifecycle.lock().await;
        let runtime = self.runtime.read().await;
        let Some(runtime) = &*runtime else {
            return Err(RuntimeError::Lifecycle {
                operation: "switch_llm",
                actual: self.status().await.to_string(),
            });
        };

        let active = runtime.sessions.active_sessions().await;
        if !active.is_empty() {
            if !force {
                return Err(RuntimeError::BusyRun(active[0].clone()));
            }
            for id in &active {
                if let Some(session) = runtime.sessions.get(id).await? {
                    session.cancel().await;
                }
            }
            // Give cancellation a moment to land before the swap.
            let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
            loop {
                if runtime.sessions.active_sessions().await.is_empty() {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        runtime.services.set_llm(Arc::clone(&client)).await;
        *self.llm_client.write().await = client;
        if let Some(llm_config) = llm_config {
            *runtime.services.llm_limits.write().await = limits_from(&llm_config);
            self.config.write().await.llm = llm_config;
        }
        info!(agent_id = %self.agent_id, "LLM client switched");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session operations
    // -----------------------------------------------------------------------

    async fn require_runtime(&self) -> RuntimeResult<(Arc<SessionServices>, Arc<SessionManager>)> {
        let runtime = self.runtime.read().await;
        match &*runtime {
            Some(rt) => Ok((Arc::clone(&rt.services), Arc::clone(&rt.sessions))),
            None => Err(RuntimeError::Lifecycle {
                operation: "run",
                actual: self.status().await.to_string(),
            }),
        }
    }

    /// Run one user turn in a session (created if missing).
    ///
    /// # Errors
    ///
    /// Propagates run failures; queue-full and lifecycle misuse are typed.
    pub async fn run(
        &self,
        session_id: impl Into<SessionId>,
        input: impl Into<String>,
    ) -> RuntimeResult<RunOutcome> {
        let (_, sessions) = self.require_runtime().await?;
        let session = sessions.get_or_create(&session_id.into()).await?;
        session.run(input.into()).await
    }

    /// Cancel a session's active run. No-op for idle or unknown sessions.
    pub async fn cancel(&self, session_id: impl Into<SessionId>) -> RuntimeResult<()> {
        let (_, sessions) = self.require_runtime().await?;
        if let Some(session) = sessions.get(&session_id.into()).await? {
            session.cancel().await;
        }
        Ok(())
    }

    /// Drain a session's queued messages back to the caller.
    ///
    /// # Errors
    ///
    /// Returns lifecycle errors only; an unknown session yields an empty
    /// vec.
    pub async fn clear_message_queue(
        &self,
        session_id: impl Into<SessionId>,
    ) -> RuntimeResult<Vec<QueuedMessage>> {
        let (_, sessions) = self.require_runtime().await?;
        match sessions.get(&session_id.into()).await? {
            Some(session) => Ok(session.clear_queue()),
            None => Ok(Vec::new()),
        }
    }

    /// Number of messages queued for a session.
    pub async fn queued_message_count(
        &self,
        session_id: impl Into<SessionId>,
    ) -> RuntimeResult<usize> {
        let (_, sessions) = self.require_runtime().await?;
        Ok(sessions
            .get(&session_id.into())
            .await?
            .map_or(0, |s| s.queued_count()))
    }

    /// Set a session's title (persisted; emits `dexto:sessionTitleUpdated`).
    ///
    /// # Errors
    ///
    /// Propagates storage and lifecycle errors.
    pub async fn set_session_title(
        &self,
        session_id: impl Into<SessionId>,
        title: impl Into<String>,
    ) -> RuntimeResult<()> {
        let (_, sessions) = self.require_runtime().await?;
        let session = sessions.get_or_create(&session_id.into()).await?;
        session.set_title(title).await
    }

    /// Clear a session's history.
    pub async fn reset_conversation(&self, session_id: impl Into<SessionId>) -> RuntimeResult<()> {
        let (_, sessions) = self.require_runtime().await?;
        if let Some(session) = sessions.get(&session_id.into()).await? {
            session.reset_conversation().await?;
        }
        Ok(())
    }

    /// The session manager (introspection, tests).
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error when the agent is not running.
    pub async fn sessions(&self) -> RuntimeResult<Arc<SessionManager>> {
        let (_, sessions) = self.require_runtime().await?;
        Ok(sessions)
    }

    // -----------------------------------------------------------------------
    // MCP operations
    // -----------------------------------------------------------------------

    /// Connect (or reconnect) a named MCP server.
    ///
    /// # Errors
    ///
    /// Propagates strict-mode connection failures and lifecycle misuse.
    pub async fn connect_mcp_server(
        &self,
        name: &str,
        spec: McpServerConfig,
    ) -> RuntimeResult<()> {
        let (services, _) = self.require_runtime().await?;
        services.mcp.connect(name, spec.clone()).await?;
        self.config
            .write()
            .await
            .mcp_servers
            .insert(name.to_owned(), spec);
        Ok(())
    }

    /// The aggregated MCP tool namespace (shadowed entries included).
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error when the agent is not running.
    pub async fn list_mcp_tools(&self) -> RuntimeResult<Vec<dexto_mcp::AggregatedTool>> {
        let (services, _) = self.require_runtime().await?;
        Ok(services.mcp.list_tools().await)
    }

    /// Disconnect a named MCP server.
    ///
    /// # Errors
    ///
    /// Propagates unknown-server and lifecycle errors.
    pub async fn disconnect_mcp_server(&self, name: &str) -> RuntimeResult<()> {
        let (services, _) = self.require_runtime().await?;
        services.mcp.disconnect(name).await?;
        self.config.write().await.mcp_servers.remove(name);
        Ok(())
    }
}

fn approval_policy_from(config: &AgentConfig) -> ApprovalPolicy {
    let confirmation = &config.tool_confirmation;
    ApprovalPolicy {
        always_deny: confirmation
            .tool_policies
            .always_deny
            .iter()
            .cloned()
            .collect(),
        always_allow: confirmation
            .tool_policies
            .always_allow
            .iter()
            .cloned()
            .collect(),
        mode: match confirmation.mode {
            ToolConfirmationMode::Manual => ApprovalMode::Manual,
            ToolConfirmationMode::AutoApprove => ApprovalMode::AutoApprove,
            ToolConfirmationMode::AutoDeny => ApprovalMode::AutoDeny,
        },
        timeout: Duration::from_millis(confirmation.timeout_ms),
        cache_storage: match confirmation.allowed_tools_storage {
            AllowedToolsStorage::Memory => CacheStorage::Memory,
            AllowedToolsStorage::Persistent => CacheStorage::Persistent,
        },
    }
}

fn limits_from(llm: &LlmConfig) -> LlmLimits {
    let defaults = LlmLimits::default();
    LlmLimits {
        max_iterations: llm.max_iterations,
        max_input_tokens: llm
            .max_input_tokens
            .map_or(defaults.max_input_tokens, |t| t as usize),
        headroom: defaults.headroom,
    }
}

fn build_internal_tools(config: &AgentConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in &config.internal_tools {
        match tool {
            InternalToolName::AskUser => registry.register(Arc::new(AskUserTool)),
            InternalToolName::EditFile => registry.register(Arc::new(EditFileTool)),
            InternalToolName::CreateFiles => registry.register(Arc::new(CreateFilesTool)),
        }
    }
    registry
}

fn clone_entry(entry: &PluginEntry) -> PluginEntry {
    PluginEntry {
        name: entry.name.clone(),
        priority: entry.priority,
        blocking: entry.blocking,
        enabled: entry.enabled,
        config: entry.config.clone(),
        plugin: Arc::clone(&entry.plugin),
    }
}

/// Derive a throwaway data source matching a config-source URI's scheme.
fn data_source_for_uri(uri: &str) -> DataSourceConfig {
    if uri.starts_with("file://") {
        DataSourceConfig::Filesystem {
            root: "/".to_owned(),
        }
    } else {
        DataSourceConfig::Http {
            headers: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for DextoAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DextoAgent")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}
