//! `create_files` — write one or more new files into the workspace.

use serde_json::{Value, json};

use crate::edit_file::resolve_workspace_path;
use crate::{InternalTool, ToolContext, ToolError, ToolResult};

/// Creates files (with parent directories) inside the workspace.
pub struct CreateFilesTool;

#[async_trait::async_trait]
impl InternalTool for CreateFilesTool {
    fn name(&self) -> &'static str {
        "create_files"
    }

    fn description(&self) -> &'static str {
        "Create one or more files. Parent directories are created as needed. Refuses to \
         overwrite existing files unless overwrite is true."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {
                                "type": "string",
                                "description": "Path relative to the workspace"
                            },
                            "content": {
                                "type": "string",
                                "description": "File content"
                            }
                        },
                        "required": ["path", "content"]
                    }
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Allow overwriting existing files (default: false)",
                    "default": false
                }
            },
            "required": ["files"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<Value> {
        let files = args
            .get("files")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArguments("files is required".into()))?;
        if files.is_empty() {
            return Err(ToolError::InvalidArguments("files must not be empty".into()));
        }
        let overwrite = args
            .get("overwrite")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // Validate everything before touching the disk.
        let mut resolved = Vec::with_capacity(files.len());
        for file in files {
            let raw_path = file
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArguments("each file needs a path".into()))?;
            let content = file
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArguments("each file needs content".into()))?;
            let path = resolve_workspace_path(&ctx.workspace_root, raw_path)?;
            if path.exists() && !overwrite {
                return Err(ToolError::ExecutionFailed(format!(
                    "{raw_path} already exists — pass overwrite to replace it"
                )));
            }
            resolved.push((raw_path.to_owned(), path, content.to_owned()));
        }

        ctx.cancel.throw_if_cancelled().map_err(|_| ToolError::Cancelled)?;

        let mut written = Vec::with_capacity(resolved.len());
        for (raw_path, path, content) in resolved {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content.as_bytes()).await?;
            written.push(raw_path);
        }

        Ok(json!({ "created": written }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexto_approval::{ApprovalManager, ApprovalPolicy};
    use dexto_core::{AgentId, CancelToken};
    use dexto_events::EventBus;
    use dexto_logger::{LogLevel, Logger};
    use dexto_storage::MemoryDatabase;
    use std::path::Path;
    use std::sync::Arc;

    fn ctx(root: &Path) -> ToolContext {
        ToolContext {
            session_id: None,
            workspace_root: root.to_path_buf(),
            approvals: Arc::new(ApprovalManager::new(
                ApprovalPolicy::default(),
                Arc::new(EventBus::new()),
                Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error),
                Arc::new(MemoryDatabase::new()),
                "test",
            )),
            cancel: CancelToken::new(),
        }
    }

    #[tokio::test]
    async fn test_create_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = CreateFilesTool
            .execute(
                json!({"files": [
                    {"path": "src/lib.rs", "content": "pub fn f() {}"},
                    {"path": "README.md", "content": "# hi"}
                ]}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(result["created"].as_array().unwrap().len(), 2);
        assert!(dir.path().join("src/lib.rs").exists());
    }

    #[tokio::test]
    async fn test_refuses_overwrite_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();

        let err = CreateFilesTool
            .execute(
                json!({"files": [{"path": "a.txt", "content": "new"}]}),
                &ctx(dir.path()),
            )
            .await;
        assert!(matches!(err, Err(ToolError::ExecutionFailed(_))));
        // Untouched.
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "old");

        CreateFilesTool
            .execute(
                json!({"files": [{"path": "a.txt", "content": "new"}], "overwrite": true}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_validates_before_writing_anything() {
        let dir = tempfile::tempdir().unwrap();
        let err = CreateFilesTool
            .execute(
                json!({"files": [
                    {"path": "ok.txt", "content": "fine"},
                    {"path": "../escape.txt", "content": "nope"}
                ]}),
                &ctx(dir.path()),
            )
            .await;
        assert!(err.is_err());
        assert!(!dir.path().join("ok.txt").exists());
    }
}
