//! Dexto Tools - Unified tool registry and execution pipeline.
//!
//! The [`ToolManager`] fronts internal tools and MCP tools behind one
//! `execute` operation. Every invocation flows through the approval
//! manager; denials, timeouts, and cancellations come back as structured
//! error *results* the model can react to, never as run-aborting errors.
//! The only failure that aborts a run is a blocking plugin failure.
//!
//! Internal tools run in-process: `ask_user` escalates to the approval
//! handler as an elicitation, `edit_file` and `create_files` touch the
//! workspace and are approval-gated like everything else.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod ask_user;
mod create_files;
mod edit_file;
mod error;
mod manager;
mod truncate;

pub use ask_user::AskUserTool;
pub use create_files::CreateFilesTool;
pub use edit_file::EditFileTool;
pub use error::{ToolError, ToolResult};
pub use manager::{ToolExecutionResult, ToolManager};
pub use truncate::truncate_output;

use dexto_approval::ApprovalManager;
use dexto_core::{CancelToken, SessionId};
use dexto_llm::ToolDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// An internal tool that executes directly in-process.
#[async_trait::async_trait]
pub trait InternalTool: Send + Sync {
    /// Tool name in the aggregated namespace.
    fn name(&self) -> &'static str;

    /// Human-readable description for the LLM.
    fn description(&self) -> &'static str;

    /// JSON schema for tool input parameters.
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<Value>;
}

/// Shared context available to internal tools for one invocation.
pub struct ToolContext {
    /// Session the call belongs to.
    pub session_id: Option<SessionId>,
    /// Workspace root for filesystem-touching tools.
    pub workspace_root: PathBuf,
    /// Approval manager, for elicitations.
    pub approvals: Arc<ApprovalManager>,
    /// The run's cancel token.
    pub cancel: CancelToken,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

/// Registry of internal tools for lookup and LLM definition export.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn InternalTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Arc<dyn InternalTool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Get a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn InternalTool>> {
        self.tools.get(name)
    }

    /// Whether a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Export all tool definitions for the LLM.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| {
                ToolDefinition::new(t.name())
                    .with_description(t.description())
                    .with_schema(t.input_schema())
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
