//! The shared service container handed to every session.

use dexto_approval::ApprovalManager;
use dexto_config::SessionsConfig;
use dexto_events::EventBus;
use dexto_llm::LlmClient;
use dexto_logger::Logger;
use dexto_mcp::McpManager;
use dexto_plugins::{AgentFacade, PluginManager};
use dexto_tools::ToolManager;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

use crate::prompt::SystemPromptComposer;
use crate::store::SessionStore;

/// Per-run LLM limits, swappable on `switch_llm` / reload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LlmLimits {
    pub max_iterations: u32,
    pub max_input_tokens: usize,
    /// Tokens reserved for the reply when trimming input.
    pub headroom: usize,
}

impl Default for LlmLimits {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_input_tokens: 200_000,
            headroom: 4_096,
        }
    }
}

/// Everything a [`ChatSession`](crate::ChatSession) needs, shared across
/// sessions. The agent owns one of these; sessions hold an `Arc`.
pub struct SessionServices {
    /// Active LLM client; swapped atomically by `switch_llm`.
    pub(crate) llm: RwLock<Arc<dyn LlmClient>>,
    /// Per-run LLM limits.
    pub(crate) llm_limits: RwLock<LlmLimits>,
    /// The tool pipeline.
    pub(crate) tools: Arc<ToolManager>,
    /// Plugin hooks.
    pub(crate) plugins: Arc<PluginManager>,
    /// Approval state machine.
    pub(crate) approvals: Arc<ApprovalManager>,
    /// MCP connections.
    pub(crate) mcp: Arc<McpManager>,
    /// Event bus.
    pub(crate) bus: Arc<EventBus>,
    /// Logger root for session-scoped children.
    pub(crate) logger: Logger,
    /// Session/message persistence.
    pub(crate) store: SessionStore,
    /// System prompt assembly.
    pub(crate) prompt: RwLock<SystemPromptComposer>,
    /// Session limits.
    pub(crate) session_config: SessionsConfig,
    /// Weak back-reference for plugin contexts.
    pub(crate) agent: RwLock<Weak<dyn AgentFacade>>,
}

impl SessionServices {
    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The approval manager.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalManager> {
        &self.approvals
    }

    /// The MCP manager.
    #[must_use]
    pub fn mcp(&self) -> &Arc<McpManager> {
        &self.mcp
    }

    /// The active LLM client.
    pub async fn llm(&self) -> Arc<dyn LlmClient> {
        Arc::clone(&*self.llm.read().await)
    }

    /// Swap the LLM client.
    pub(crate) async fn set_llm(&self, client: Arc<dyn LlmClient>) {
        *self.llm.write().await = client;
    }
}

impl std::fmt::Debug for SessionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServices").finish_non_exhaustive()
    }
}
