//! `edit_file` — exact string replacement in workspace files.

use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};

use crate::{InternalTool, ToolContext, ToolError, ToolResult};

/// Resolve a tool-supplied path beneath the workspace root.
///
/// Relative paths join the root; absolute paths must already lie beneath
/// it. Parent traversal is rejected.
pub(crate) fn resolve_workspace_path(root: &Path, raw: &str) -> ToolResult<PathBuf> {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    if joined
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ToolError::InvalidArguments(format!(
            "path {raw} contains parent traversal"
        )));
    }
    if !joined.starts_with(root) {
        return Err(ToolError::InvalidArguments(format!(
            "path {raw} is outside the workspace"
        )));
    }
    Ok(joined)
}

/// Performs exact string replacements in files.
pub struct EditFileTool;

#[async_trait::async_trait]
impl InternalTool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Performs exact string replacements in files. The old_string must be unique in the file \
         unless replace_all is true. Fails if old_string is not found or matches multiple times \
         (without replace_all)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to edit, relative to the workspace"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)",
                    "default": false
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<Value> {
        let raw_path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?;
        let old_string = args
            .get("old_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("old_string is required".into()))?;
        let new_string = args
            .get("new_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("new_string is required".into()))?;
        let replace_all = args
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let path = resolve_workspace_path(&ctx.workspace_root, raw_path)?;
        if !path.exists() {
            return Err(ToolError::PathNotFound(raw_path.to_owned()));
        }

        ctx.cancel.throw_if_cancelled().map_err(|_| ToolError::Cancelled)?;

        let content = tokio::fs::read_to_string(&path).await?;

        let count = content.matches(old_string).count();
        if count == 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "old_string not found in {raw_path}"
            )));
        }
        if count > 1 && !replace_all {
            return Err(ToolError::ExecutionFailed(format!(
                "old_string found {count} times in {raw_path} — use replace_all or provide more \
                 context to make it unique"
            )));
        }

        let new_content = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        tokio::fs::write(&path, &new_content).await?;

        Ok(json!({
            "path": raw_path,
            "replacements": if replace_all { count } else { 1 },
        }))
    }
}
