//! The plugin manager: ordered iteration with blocking semantics.

use dexto_llm::{AssistantTurn, ToolCall};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::context::PluginContext;
use crate::error::{PluginError, PluginResult};
use crate::hooks::{
    LlmRequestAction, LlmRequestPayload, Plugin, ResponseAction, ToolCallPayload,
    ToolResultPayload,
};

/// A registered plugin with its ordering and failure semantics.
pub struct PluginEntry {
    /// Unique name.
    pub name: String,
    /// Ascending order; ties break by registration order.
    pub priority: i32,
    /// Whether failures abort the run and mutations are applied.
    pub blocking: bool,
    /// Whether the plugin participates at all.
    pub enabled: bool,
    /// Config value passed to `initialize`.
    pub config: Option<Value>,
    /// The implementation.
    pub plugin: Arc<dyn Plugin>,
}

impl PluginEntry {
    /// Create an enabled, non-blocking entry with priority 0.
    #[must_use]
    pub fn new(name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            blocking: false,
            enabled: true,
            config: None,
            plugin,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the plugin blocking.
    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Disable the plugin.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Attach an `initialize` config value.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("blocking", &self.blocking)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Holds registered plugins and runs the hooks in order.
#[derive(Default)]
pub struct PluginManager {
    entries: Vec<PluginEntry>,
}

impl PluginManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicateName`] when the name is taken.
    pub fn register(&mut self, entry: PluginEntry) -> PluginResult<()> {
        if self.entries.iter().any(|e| e.name == entry.name) {
            return Err(PluginError::DuplicateName(entry.name));
        }
        // Stable sort keeps registration order within equal priorities.
        let at = self
            .entries
            .iter()
            .position(|e| e.priority > entry.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
        Ok(())
    }

    /// Registered plugin names, in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `initialize` on every enabled plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Blocking`] when a blocking plugin fails.
    pub async fn initialize_all(&self, ctx: &PluginContext) -> PluginResult<()> {
        for entry in self.enabled() {
            if let Err(message) = entry.plugin.initialize(entry.config.as_ref(), ctx).await {
                if entry.blocking {
                    return Err(PluginError::Blocking {
                        name: entry.name.clone(),
                        hook: "initialize",
                        message,
                    });
                }
                warn!(plugin = %entry.name, %message, "Plugin initialize failed, skipping");
            }
        }
        Ok(())
    }

    /// Run `cleanup` on every enabled plugin. Failures are logged only.
    pub async fn cleanup_all(&self, ctx: &PluginContext) {
        for entry in self.enabled() {
            if let Err(message) = entry.plugin.cleanup(ctx).await {
                warn!(plugin = %entry.name, %message, "Plugin cleanup failed");
            }
        }
    }

    /// Run the `before_llm_request` hook chain.
    ///
    /// Returns the (possibly mutated) payload and an optional synthetic
    /// assistant turn from a blocking short-circuit.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Blocking`] when a blocking plugin fails.
    pub async fn before_llm_request(
        &self,
        mut payload: LlmRequestPayload,
        ctx: &PluginContext,
    ) -> PluginResult<(LlmRequestPayload, Option<AssistantTurn>)> {
        for entry in self.enabled() {
            match entry.plugin.before_llm_request(&payload, ctx).await {
                Ok(action) => {
                    if entry.blocking {
                        if let Some(turn) = action.short_circuit {
                            return Ok((payload, Some(turn)));
                        }
                        if let Some(messages) = action.messages {
                            payload.messages = messages;
                        }
                        if let Some(tools) = action.tools {
                            payload.tools = tools;
                        }
                    } else if action.short_circuit.is_some()
                        || action.messages.is_some()
                        || action.tools.is_some()
                    {
                        warn!(
                            plugin = %entry.name,
                            "Ignoring mutation from non-blocking plugin"
                        );
                    }
                },
                Err(message) => self.on_failure(entry, "before_llm_request", message)?,
            }
        }
        Ok((payload, None))
    }

    /// Run the `before_tool_call` hook chain.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Blocking`] when a blocking plugin fails.
    pub async fn before_tool_call(
        &self,
        mut call: ToolCall,
        ctx: &PluginContext,
    ) -> PluginResult<(ToolCall, Option<ToolResultPayload>)> {
        for entry in self.enabled() {
            let payload = ToolCallPayload { call: call.clone() };
            match entry.plugin.before_tool_call(&payload, ctx).await {
                Ok(action) => {
                    if entry.blocking {
                        if let Some(result) = action.short_circuit {
                            return Ok((call, Some(result)));
                        }
                        if let Some(mutated) = action.call {
                            call = mutated;
                        }
                    }
                },
                Err(message) => self.on_failure(entry, "before_tool_call", message)?,
            }
        }
        Ok((call, None))
    }

    /// Run the `after_tool_result` hook chain.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Blocking`] when a blocking plugin fails.
    pub async fn after_tool_result(
        &self,
        call: &ToolCall,
        mut result: ToolResultPayload,
        ctx: &PluginContext,
    ) -> PluginResult<ToolResultPayload> {
        for entry in self.enabled() {
            match entry.plugin.after_tool_result(call, &result, ctx).await {
                Ok(action) => {
                    if entry.blocking {
                        if let Some(mutated) = action.result {
                            result = mutated;
                        }
                    }
                },
                Err(message) => self.on_failure(entry, "after_tool_result", message)?,
            }
        }
        Ok(result)
    }

    /// Run the `before_response` hook chain.
    ///
    /// Mutations from blocking plugins must preserve tool-call identity.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Blocking`] when a blocking plugin fails and
    /// [`PluginError::ToolCallIdentityViolation`] when a blocking plugin
    /// alters the turn's tool-call ids.
    pub async fn before_response(
        &self,
        mut assistant: AssistantTurn,
        ctx: &PluginContext,
    ) -> PluginResult<AssistantTurn> {
        for entry in self.enabled() {
            match entry.plugin.before_response(&assistant, ctx).await {
                Ok(ResponseAction {
                    assistant: Some(mutated),
                }) if entry.blocking => {
                    let same_calls = mutated.tool_calls.len() == assistant.tool_calls.len()
                        && mutated
                            .tool_calls
                            .iter()
                            .zip(&assistant.tool_calls)
                            .all(|(a, b)| a.id == b.id);
                    if !same_calls {
                        return Err(PluginError::ToolCallIdentityViolation {
                            name: entry.name.clone(),
                        });
                    }
                    assistant = mutated;
                },
                Ok(_) => {},
                Err(message) => self.on_failure(entry, "before_response", message)?,
            }
        }
        Ok(assistant)
    }

    fn enabled(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }

    fn on_failure(
        &self,
        entry: &PluginEntry,
        hook: &'static str,
        message: String,
    ) -> PluginResult<()> {
        if entry.blocking {
            Err(PluginError::Blocking {
                name: entry.name.clone(),
                hook,
                message,
            })
        } else {
            warn!(plugin = %entry.name, hook, %message, "Plugin failed, skipping");
            Ok(())
        }
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.names())
            .finish()
    }
}
