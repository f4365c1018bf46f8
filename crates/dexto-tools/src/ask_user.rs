//! `ask_user` — escalate a question to the human through the approval
//! handler.

use serde_json::{Value, json};

use crate::{InternalTool, ToolContext, ToolError, ToolResult};

/// Asks the user a free-form question via the registered approval handler.
pub struct AskUserTool;

#[async_trait::async_trait]
impl InternalTool for AskUserTool {
    fn name(&self) -> &'static str {
        "ask_user"
    }

    fn description(&self) -> &'static str {
        "Ask the user a clarifying question and wait for their answer. Use when a decision \
         genuinely needs human input."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to present to the user"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<Value> {
        let question = args
            .get("question")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("question is required".into()))?;

        let outcome = ctx
            .approvals
            .request_elicitation(ctx.session_id.as_ref(), question, &ctx.cancel)
            .await?;

        match outcome.status {
            dexto_events::ApprovalStatus::Approved => Ok(json!({
                "answer": outcome.answer.unwrap_or_default(),
            })),
            dexto_events::ApprovalStatus::Cancelled => Err(ToolError::Cancelled),
            dexto_events::ApprovalStatus::TimedOut => Err(ToolError::ExecutionFailed(
                "user did not answer in time".into(),
            )),
            _ => Err(ToolError::ExecutionFailed(
                "user declined to answer".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dexto_approval::{
        ApprovalHandler, ApprovalManager, ApprovalPolicy, ApprovalRequest, HandlerResponse,
    };
    use dexto_core::{AgentId, CancelToken, SessionId};
    use dexto_events::EventBus;
    use dexto_logger::{LogLevel, Logger};
    use dexto_storage::MemoryDatabase;
    use std::sync::Arc;

    struct Answerer;

    #[async_trait]
    impl ApprovalHandler for Answerer {
        async fn handle(&self, request: ApprovalRequest) -> HandlerResponse {
            assert_eq!(request.question.as_deref(), Some("Deploy to prod?"));
            HandlerResponse::answered("yes, after 5pm")
        }
    }

    async fn ctx_with_handler(handler: Option<Arc<dyn ApprovalHandler>>) -> ToolContext {
        let approvals = Arc::new(ApprovalManager::new(
            ApprovalPolicy::default(),
            Arc::new(EventBus::new()),
            Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error),
            Arc::new(MemoryDatabase::new()),
            "test",
        ));
        if let Some(handler) = handler {
            approvals.set_handler(handler).await;
        }
        ToolContext {
            session_id: Some(SessionId::from("s1")),
            workspace_root: std::env::temp_dir(),
            approvals,
            cancel: CancelToken::new(),
        }
    }

    #[tokio::test]
    async fn test_ask_user_returns_answer() {
        let ctx = ctx_with_handler(Some(Arc::new(Answerer))).await;
        let result = AskUserTool
            .execute(json!({"question": "Deploy to prod?"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result, json!({"answer": "yes, after 5pm"}));
    }

    #[tokio::test]
    async fn test_ask_user_without_handler_fails() {
        let ctx = ctx_with_handler(None).await;
        let result = AskUserTool
            .execute(json!({"question": "Deploy to prod?"}), &ctx)
            .await;
        assert!(matches!(result, Err(ToolError::Approval(_))));
    }

    #[tokio::test]
    async fn test_missing_question_rejected() {
        let ctx = ctx_with_handler(Some(Arc::new(Answerer))).await;
        let result = AskUserTool.execute(json!({}), &ctx).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
