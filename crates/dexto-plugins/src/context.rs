//! Context handed to every plugin hook.

use dexto_core::{AgentId, SessionId};
use dexto_events::EventBus;
use dexto_logger::Logger;
use std::sync::{Arc, Weak};

/// Minimal agent facade exposed to plugins.
///
/// Plugins hold a weak reference: the agent owns the plugin manager, and
/// a strong back-reference would keep the whole service graph alive.
pub trait AgentFacade: Send + Sync {
    /// The agent id.
    fn agent_id(&self) -> AgentId;
    /// The agent's event bus.
    fn event_bus(&self) -> Arc<EventBus>;
}

/// Per-invocation plugin context.
#[derive(Clone)]
pub struct PluginContext {
    /// Session the hook runs in.
    pub session_id: SessionId,
    /// End-user identifier, when the transport supplied one.
    pub user_id: Option<String>,
    /// Logger scoped to the plugin layer.
    pub logger: Logger,
    /// The event bus, for emitting custom notifications.
    pub event_bus: Arc<EventBus>,
    /// Weak handle to the owning agent.
    pub agent: Weak<dyn AgentFacade>,
}

impl PluginContext {
    /// Upgrade the agent handle, when the agent is still alive.
    #[must_use]
    pub fn agent(&self) -> Option<Arc<dyn AgentFacade>> {
        self.agent.upgrade()
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
