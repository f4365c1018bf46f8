//! The plugin trait and hook payload/action shapes.

use async_trait::async_trait;
use dexto_llm::{AssistantTurn, Message, ToolCall, ToolDefinition};
use serde_json::Value;

use crate::context::PluginContext;

/// Payload for `before_llm_request`.
#[derive(Debug, Clone)]
pub struct LlmRequestPayload {
    /// History about to be sent.
    pub messages: Vec<Message>,
    /// Tool catalogue about to be sent.
    pub tools: Vec<ToolDefinition>,
}

/// Action returned from `before_llm_request`.
#[derive(Debug, Clone, Default)]
pub struct LlmRequestAction {
    /// Replacement history (blocking plugins only).
    pub messages: Option<Vec<Message>>,
    /// Replacement tool catalogue (blocking plugins only).
    pub tools: Option<Vec<ToolDefinition>>,
    /// Skip the model call and use this synthetic turn instead
    /// (blocking plugins only).
    pub short_circuit: Option<AssistantTurn>,
}

/// Payload for `before_tool_call`.
#[derive(Debug, Clone)]
pub struct ToolCallPayload {
    /// The call about to be dispatched.
    pub call: ToolCall,
}

/// A tool result as plugins see it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultPayload {
    /// Result payload (string or structured).
    pub result: Value,
    /// Whether the result is an error.
    pub is_error: bool,
}

/// Action returned from `before_tool_call`.
#[derive(Debug, Clone, Default)]
pub struct ToolCallAction {
    /// Replacement call, typically mutated args (blocking plugins only).
    pub call: Option<ToolCall>,
    /// Skip dispatch and use this result instead (blocking plugins only).
    pub short_circuit: Option<ToolResultPayload>,
}

/// Action returned from `after_tool_result`.
#[derive(Debug, Clone, Default)]
pub struct ToolResultAction {
    /// Replacement result (blocking plugins only).
    pub result: Option<ToolResultPayload>,
}

/// Action returned from `before_response`.
#[derive(Debug, Clone, Default)]
pub struct ResponseAction {
    /// Replacement assistant turn (blocking plugins only). The returned
    /// turn must carry the same tool-call ids as the input turn.
    pub assistant: Option<AssistantTurn>,
}

/// A plugin. Every hook is optional; defaults are no-ops.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once when the agent starts, with this entry's config value.
    async fn initialize(&self, config: Option<&Value>, ctx: &PluginContext) -> Result<(), String> {
        let _ = (config, ctx);
        Ok(())
    }

    /// Called once when the agent stops.
    async fn cleanup(&self, ctx: &PluginContext) -> Result<(), String> {
        let _ = ctx;
        Ok(())
    }

    /// Runs before every model call.
    async fn before_llm_request(
        &self,
        payload: &LlmRequestPayload,
        ctx: &PluginContext,
    ) -> Result<LlmRequestAction, String> {
        let _ = (payload, ctx);
        Ok(LlmRequestAction::default())
    }

    /// Runs before every tool dispatch (after approval).
    async fn before_tool_call(
        &self,
        payload: &ToolCallPayload,
        ctx: &PluginContext,
    ) -> Result<ToolCallAction, String> {
        let _ = (payload, ctx);
        Ok(ToolCallAction::default())
    }

    /// Runs after every tool result.
    async fn after_tool_result(
        &self,
        call: &ToolCall,
        result: &ToolResultPayload,
        ctx: &PluginContext,
    ) -> Result<ToolResultAction, String> {
        let _ = (call, result, ctx);
        Ok(ToolResultAction::default())
    }

    /// Runs after stream assembly, before the assistant message is
    /// persisted and emitted.
    async fn before_response(
        &self,
        assistant: &AssistantTurn,
        ctx: &PluginContext,
    ) -> Result<ResponseAction, String> {
        let _ = (assistant, ctx);
        Ok(ResponseAction::default())
    }
}
