//! The approval manager.

use async_trait::async_trait;
use dashmap::DashMap;
use dexto_core::{ApprovalId, CancelToken, SessionId};
use dexto_events::{AgentEvent, ApprovalKind, ApprovalStatus, EventBus};
use dexto_logger::Logger;
use dexto_storage::Database;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ApprovalError, ApprovalResult};
use crate::policy::{ApprovalMode, ApprovalPolicy, CacheStorage};
use crate::request::{ApprovalOutcome, ApprovalRequest, HandlerResponse, HandlerVerdict};

/// Handler that produces approval decisions.
///
/// Registered at runtime as a direct callable. Transports that implement
/// approvals register themselves here and use the bus events only to
/// render UI.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Decide one request.
    ///
    /// The manager enforces the timeout and cancellation around this call;
    /// a handler that never returns simply times the request out.
    async fn handle(&self, request: ApprovalRequest) -> HandlerResponse;
}

#[derive(Default)]
struct SessionToolCache {
    allowed: HashSet<String>,
    denied: HashSet<String>,
}

struct PendingEntry {
    session_id: Option<SessionId>,
    cancel: CancelToken,
}

/// Orchestrates the approval flow for every tool invocation.
pub struct ApprovalManager {
    policy: RwLock<ApprovalPolicy>,
    handler: RwLock<Option<Arc<dyn ApprovalHandler>>>,
    pending: DashMap<ApprovalId, PendingEntry>,
    session_caches: DashMap<SessionId, SessionToolCache>,
    bus: Arc<EventBus>,
    logger: Logger,
    database: Arc<dyn Database>,
    scope: String,
}

impl ApprovalManager {
    /// Create a manager.
    ///
    /// `scope` keys persistent remembered choices (the agent id); a scope
    /// change after reload intentionally orphans previous entries.
    #[must_use]
    pub fn new(
        policy: ApprovalPolicy,
        bus: Arc<EventBus>,
        logger: Logger,
        database: Arc<dyn Database>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            policy: RwLock::new(policy),
            handler: RwLock::new(None),
            pending: DashMap::new(),
            session_caches: DashMap::new(),
            bus,
            logger: logger.child("approval", []),
            database,
            scope: scope.into(),
        }
    }

    /// Register the approval handler.
    pub async fn set_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// Remove the approval handler.
    pub async fn clear_handler(&self) {
        *self.handler.write().await = None;
    }

    /// Whether a handler is registered.
    pub async fn has_handler(&self) -> bool {
        self.handler.read().await.is_some()
    }

    /// Replace the policy.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::HandlerMissing`] when switching to manual
    /// mode without a registered handler.
    pub async fn set_policy(&self, policy: ApprovalPolicy) -> ApprovalResult<()> {
        if policy.mode == ApprovalMode::Manual && !self.has_handler().await {
            return Err(ApprovalError::HandlerMissing);
        }
        *self.policy.write().await = policy;
        Ok(())
    }

    /// Current policy snapshot.
    pub async fn policy(&self) -> ApprovalPolicy {
        self.policy.read().await.clone()
    }

    /// Fail fast when manual mode has no handler. Called by the agent
    /// before opening any outward connection.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::HandlerMissing`] on violation.
    pub async fn ensure_ready(&self) -> ApprovalResult<()> {
        let mode = self.policy.read().await.mode;
        if mode == ApprovalMode::Manual && !self.has_handler().await {
            return Err(ApprovalError::HandlerMissing);
        }
        Ok(())
    }

    /// Number of requests currently pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Decide whether a tool call may proceed.
    ///
    /// Decision order, first match wins: policy deny, policy allow,
    /// session allow-cache, session deny-cache, mode. Manual mode
    /// registers a pending request and races the handler against the
    /// timeout and `cancel`.
    ///
    /// Denial, timeout, and cancellation are data on the returned
    /// [`ApprovalOutcome`]; the only error is a missing handler in manual
    /// mode.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::HandlerMissing`] in manual mode with no
    /// registered handler.
    pub async fn request_approval(
        &self,
        session_id: Option<&SessionId>,
        tool_name: &str,
        args: &Value,
        cancel: &CancelToken,
    ) -> ApprovalResult<ApprovalOutcome> {
        let policy = self.policy.read().await.clone();

        if policy.always_deny.contains(tool_name) {
            debug!(tool = tool_name, "Denied by policy");
            return Ok(ApprovalOutcome {
                reason: Some("denied by policy".to_owned()),
                ..ApprovalOutcome::direct(ApprovalStatus::Denied)
            });
        }
        if policy.always_allow.contains(tool_name) {
            debug!(tool = tool_name, "Allowed by policy");
            return Ok(ApprovalOutcome::direct(ApprovalStatus::Approved));
        }

        if let Some(session_id) = session_id {
            if let Some(cache) = self.session_caches.get(session_id) {
                if cache.allowed.contains(tool_name) {
                    return Ok(ApprovalOutcome::direct(ApprovalStatus::Approved));
                }
                if cache.denied.contains(tool_name) {
                    return Ok(ApprovalOutcome {
                        reason: Some("denied earlier this session".to_owned()),
                        ..ApprovalOutcome::direct(ApprovalStatus::Denied)
                    });
                }
            }
        }

        match policy.mode {
            ApprovalMode::AutoApprove => Ok(ApprovalOutcome::direct(ApprovalStatus::Approved)),
            ApprovalMode::AutoDeny => Ok(ApprovalOutcome {
                reason: Some("auto-deny mode".to_owned()),
                ..ApprovalOutcome::direct(ApprovalStatus::Denied)
            }),
            ApprovalMode::Manual => {
                let request = ApprovalRequest::tool_confirmation(
                    session_id.cloned(),
                    tool_name,
                    args.clone(),
                    u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX),
                );
                self.run_manual(request, &policy, cancel).await
            },
        }
    }

    /// Escalate a question to the handler (`ask_user`).
    ///
    /// Elicitations bypass policy lists and caches: there is nothing to
    /// remember, only a human to ask.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::HandlerMissing`] when no handler is
    /// registered.
    pub async fn request_elicitation(
        &self,
        session_id: Option<&SessionId>,
        question: &str,
        cancel: &CancelToken,
    ) -> ApprovalResult<ApprovalOutcome> {
        let policy = self.policy.read().await.clone();
        let request = ApprovalRequest::elicitation(
            session_id.cloned(),
            question,
            u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX),
        );
        self.run_manual(request, &policy, cancel).await
    }

    async fn run_manual(
        &self,
        request: ApprovalRequest,
        policy: &ApprovalPolicy,
        cancel: &CancelToken,
    ) -> ApprovalResult<ApprovalOutcome> {
        let handler = {
            let guard = self.handler.read().await;
            guard.as_ref().map(Arc::clone)
        };
        let Some(handler) = handler else {
            return Err(ApprovalError::HandlerMissing);
        };

        let approval_id = request.approval_id;
        let entry_cancel = CancelToken::new();
        self.pending.insert(
            approval_id,
            PendingEntry {
                session_id: request.session_id.clone(),
                cancel: entry_cancel.clone(),
            },
        );

        self.bus.publish(AgentEvent::ApprovalRequest {
            approval_id,
            session_id: request.session_id.clone(),
            kind: request.kind,
            tool_name: request.tool_name.clone(),
            args: request.args.clone(),
            timeout_ms: request.timeout_ms,
        });

        let session_id = request.session_id.clone();
        let tool_name = request.tool_name.clone();
        let kind = request.kind;

        // The handler is awaited outside every lock; the pending map only
        // sees short insert/remove critical sections.
        let response = tokio::select! {
            response = handler.handle(request) => Some(response),
            () = tokio::time::sleep(policy.timeout) => None,
            () = cancel.cancelled() => Some(HandlerResponse {
                verdict: HandlerVerdict::Cancel,
                remember_choice: false,
                answer: None,
            }),
            () = entry_cancel.cancelled() => Some(HandlerResponse {
                verdict: HandlerVerdict::Cancel,
                remember_choice: false,
                answer: None,
            }),
        };

        // Settle exactly once: the first path to remove the pending entry
        // wins; any duplicate resolution finds nothing and is ignored.
        if self.pending.remove(&approval_id).is_none() {
            warn!(%approval_id, "Approval already settled, duplicate resolution ignored");
            return Ok(ApprovalOutcome {
                approval_id: Some(approval_id),
                ..ApprovalOutcome::direct(ApprovalStatus::Cancelled)
            });
        }

        let (status, reason, answer, remember) = match response {
            None => (ApprovalStatus::TimedOut, None, None, false),
            Some(response) => match response.verdict {
                HandlerVerdict::Approve => (
                    ApprovalStatus::Approved,
                    None,
                    response.answer,
                    response.remember_choice,
                ),
                HandlerVerdict::Deny { reason } => (
                    ApprovalStatus::Denied,
                    reason,
                    None,
                    response.remember_choice,
                ),
                HandlerVerdict::Cancel => (ApprovalStatus::Cancelled, None, None, false),
            },
        };

        if remember && kind == ApprovalKind::ToolConfirmation {
            if let (Some(session_id), Some(tool_name)) = (&session_id, &tool_name) {
                self.remember(session_id, tool_name, status, policy).await;
            }
        }

        self.bus.publish(AgentEvent::ApprovalResponse {
            approval_id,
            session_id,
            status,
            remember_choice: remember.then_some(true),
        });

        self.logger.debug(
            "Approval settled",
            Some(json!({
                "approval_id": approval_id.to_string(),
                "status": status.to_string(),
            })),
        );

        Ok(ApprovalOutcome {
            approval_id: Some(approval_id),
            status,
            reason,
            answer,
        })
    }

    async fn remember(
        &self,
        session_id: &SessionId,
        tool_name: &str,
        status: ApprovalStatus,
        policy: &ApprovalPolicy,
    ) {
        {
            let mut cache = self.session_caches.entry(session_id.clone()).or_default();
            match status {
                ApprovalStatus::Approved => {
                    cache.allowed.insert(tool_name.to_owned());
                },
                ApprovalStatus::Denied => {
                    cache.denied.insert(tool_name.to_owned());
                },
                _ => return,
            }
        }

        if policy.cache_storage == CacheStorage::Persistent
            && status == ApprovalStatus::Approved
        {
            let key = self.persist_key(session_id, tool_name);
            if let Err(e) = self.database.set(&key, Value::Bool(true)).await {
                self.logger.warn(
                    "Failed to persist remembered approval",
                    Some(json!({"key": key, "error": e.to_string()})),
                );
            }
        }
    }

    /// Load persisted remembered approvals for a session into its cache.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Persistence`] when the scan fails.
    pub async fn hydrate_session(&self, session_id: &SessionId) -> ApprovalResult<usize> {
        let prefix = format!("approval:allowed:{}:{}:", self.scope, session_id);
        let entries = self.database.scan(&prefix).await?;
        let count = entries.len();
        if count > 0 {
            let mut cache = self.session_caches.entry(session_id.clone()).or_default();
            for (key, _) in entries {
                if let Some(tool) = key.strip_prefix(&prefix) {
                    cache.allowed.insert(tool.to_owned());
                }
            }
        }
        Ok(count)
    }

    /// Tools auto-approved for a session.
    #[must_use]
    pub fn allowed_tools(&self, session_id: &SessionId) -> HashSet<String> {
        self.session_caches
            .get(session_id)
            .map(|c| c.allowed.clone())
            .unwrap_or_default()
    }

    /// Tools auto-denied for a session.
    #[must_use]
    pub fn denied_tools(&self, session_id: &SessionId) -> HashSet<String> {
        self.session_caches
            .get(session_id)
            .map(|c| c.denied.clone())
            .unwrap_or_default()
    }

    /// Drop a session's caches (conversation reset, session delete).
    pub fn forget_session(&self, session_id: &SessionId) {
        self.session_caches.remove(session_id);
    }

    /// Cancel every pending approval for a session.
    ///
    /// Each pending request settles as `cancelled` through its own select
    /// arm; the response events follow from there.
    pub fn cancel_session(&self, session_id: &SessionId) -> usize {
        let mut cancelled = 0;
        for entry in &self.pending {
            if entry.value().session_id.as_ref() == Some(session_id) {
                entry.value().cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel every pending approval (agent stop).
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in &self.pending {
            entry.value().cancel.cancel();
            cancelled += 1;
        }
        cancelled
    }

    fn persist_key(&self, session_id: &SessionId, tool_name: &str) -> String {
        format!("approval:allowed:{}:{}:{}", self.scope, session_id, tool_name)
    }
}

impl std::fmt::Debug for ApprovalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalManager")
            .field("pending", &self.pending.len())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexto_core::AgentId;
    use dexto_logger::LogLevel;
    use dexto_storage::MemoryDatabase;
    use std::time::Duration;

    /// Approves everything, optionally remembering.
    struct AutoApproveHandler {
        remember: bool,
    }

    #[async_trait]
    impl ApprovalHandler for AutoApproveHandler {
        async fn handle(&self, _request: ApprovalRequest) -> HandlerResponse {
            let response = HandlerResponse::approve();
            if self.remember {
                response.remembered()
            } else {
                response
            }
        }
    }

    /// Denies everything.
    struct AutoDenyHandler;

    #[async_trait]
    impl ApprovalHandler for AutoDenyHandler {
        async fn handle(&self, _request: ApprovalRequest) -> HandlerResponse {
            HandlerResponse::deny("denied by test")
        }
    }

    /// Never answers.
    struct SilentHandler;

    #[async_trait]
    impl ApprovalHandler for SilentHandler {
        async fn handle(&self, _request: ApprovalRequest) -> HandlerResponse {
            std::future::pending::<()>().await;
            HandlerResponse::approve()
        }
    }

    fn make_manager(policy: ApprovalPolicy) -> ApprovalManager {
        let bus = Arc::new(EventBus::new());
        let logger = Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error);
        ApprovalManager::new(
            policy,
            bus,
            logger,
            Arc::new(MemoryDatabase::new()),
            "test",
        )
    }

    fn sid() -> SessionId {
        SessionId::from("s1")
    }

    #[tokio::test]
    async fn test_policy_deny_beats_everything() {
        let mut policy = ApprovalPolicy::with_mode(ApprovalMode::AutoApprove);
        policy.always_deny.insert("rm".to_owned());
        policy.always_allow.insert("rm".to_owned());
        let manager = make_manager(policy);

        let outcome = manager
            .request_approval(Some(&sid()), "rm", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, ApprovalStatus::Denied);
    }

    #[tokio::test]
    async fn test_policy_allow_skips_handler() {
        let mut policy = ApprovalPolicy::with_mode(ApprovalMode::Manual);
        policy.always_allow.insert("search".to_owned());
        let manager = make_manager(policy);
        // No handler registered; would error if the handler path ran.

        let outcome = manager
            .request_approval(Some(&sid()), "search", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert!(outcome.is_approved());
    }

    #[tokio::test]
    async fn test_manual_without_handler_errors() {
        let manager = make_manager(ApprovalPolicy::default());
        let result = manager
            .request_approval(Some(&sid()), "search", &json!({}), &CancelToken::new())
            .await;
        assert!(matches!(result, Err(ApprovalError::HandlerMissing)));
    }

    #[tokio::test]
    async fn test_ensure_ready_enforced() {
        let manager = make_manager(ApprovalPolicy::default());
        assert!(manager.ensure_ready().await.is_err());
        manager
            .set_handler(Arc::new(AutoApproveHandler { remember: false }))
            .await;
        assert!(manager.ensure_ready().await.is_ok());
    }

    #[tokio::test]
    async fn test_mode_switch_to_manual_requires_handler() {
        let manager = make_manager(ApprovalPolicy::with_mode(ApprovalMode::AutoApprove));
        let result = manager
            .set_policy(ApprovalPolicy::with_mode(ApprovalMode::Manual))
            .await;
        assert!(matches!(result, Err(ApprovalError::HandlerMissing)));
    }

    #[tokio::test]
    async fn test_remember_allow_skips_second_request() {
        let manager = make_manager(ApprovalPolicy::default());
        manager
            .set_handler(Arc::new(AutoApproveHandler { remember: true }))
            .await;

        let first = manager
            .request_approval(Some(&sid()), "search", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert!(first.is_approved());
        assert!(first.approval_id.is_some());
        assert!(manager.allowed_tools(&sid()).contains("search"));

        // Second call resolves from the cache, no pending entry created.
        let second = manager
            .request_approval(Some(&sid()), "search", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert!(second.is_approved());
        assert!(second.approval_id.is_none());
    }

    #[tokio::test]
    async fn test_session_denied_cache() {
        struct DenyRemember;
        #[async_trait]
        impl ApprovalHandler for DenyRemember {
            async fn handle(&self, _request: ApprovalRequest) -> HandlerResponse {
                HandlerResponse::deny("no").remembered()
            }
        }

        let manager = make_manager(ApprovalPolicy::default());
        manager.set_handler(Arc::new(DenyRemember)).await;

        manager
            .request_approval(Some(&sid()), "rm", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert!(manager.denied_tools(&sid()).contains("rm"));

        let second = manager
            .request_approval(Some(&sid()), "rm", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(second.status, ApprovalStatus::Denied);
        assert!(second.approval_id.is_none());
    }

    #[tokio::test]
    async fn test_timeout_settles_timed_out() {
        let mut policy = ApprovalPolicy::default();
        policy.timeout = Duration::from_millis(20);
        let manager = make_manager(policy);
        manager.set_handler(Arc::new(SilentHandler)).await;

        let outcome = manager
            .request_approval(Some(&sid()), "slow", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, ApprovalStatus::TimedOut);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_token_settles_cancelled() {
        let manager = Arc::new(make_manager(ApprovalPolicy::default()));
        manager.set_handler(Arc::new(SilentHandler)).await;

        let cancel = CancelToken::new();
        let task = {
            let manager = Arc::clone(&manager);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                manager
                    .request_approval(Some(&SessionId::from("s1")), "slow", &json!({}), &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.status, ApprovalStatus::Cancelled);
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_session_settles_pending() {
        let manager = Arc::new(make_manager(ApprovalPolicy::default()));
        manager.set_handler(Arc::new(SilentHandler)).await;

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .request_approval(
                        Some(&SessionId::from("s1")),
                        "slow",
                        &json!({}),
                        &CancelToken::new(),
                    )
                    .await
            })
        };

        // Wait until the request is pending, then cancel the session.
        for _ in 0..100 {
            if manager.pending_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.cancel_session(&SessionId::from("s1")), 1);

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.status, ApprovalStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_request_and_response_events_ordered() {
        let bus = Arc::new(EventBus::new());
        let mut receiver = bus.subscribe();
        let logger = Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error);
        let manager = ApprovalManager::new(
            ApprovalPolicy::default(),
            Arc::clone(&bus),
            logger,
            Arc::new(MemoryDatabase::new()),
            "test",
        );
        manager.set_handler(Arc::new(AutoDenyHandler)).await;

        manager
            .request_approval(Some(&sid()), "rm", &json!({}), &CancelToken::new())
            .await
            .unwrap();

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.topic(), "dexto:approvalRequest");
        let second = receiver.recv().await.unwrap();
        match second.as_ref() {
            AgentEvent::ApprovalResponse { status, .. } => {
                assert_eq!(*status, ApprovalStatus::Denied);
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_persistent_remember_survives_new_manager() {
        let db: Arc<MemoryDatabase> = Arc::new(MemoryDatabase::new());
        let bus = Arc::new(EventBus::new());
        let logger = Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error);

        let mut policy = ApprovalPolicy::default();
        policy.cache_storage = CacheStorage::Persistent;

        let manager = ApprovalManager::new(
            policy.clone(),
            Arc::clone(&bus),
            logger.clone(),
            Arc::clone(&db) as Arc<dyn Database>,
            "agent-a",
        );
        manager
            .set_handler(Arc::new(AutoApproveHandler { remember: true }))
            .await;
        manager
            .request_approval(Some(&sid()), "search", &json!({}), &CancelToken::new())
            .await
            .unwrap();

        // Same scope, fresh manager: hydrate restores the allow-cache.
        let restarted = ApprovalManager::new(
            policy.clone(),
            bus,
            logger,
            Arc::clone(&db) as Arc<dyn Database>,
            "agent-a",
        );
        assert_eq!(restarted.hydrate_session(&sid()).await.unwrap(), 1);
        assert!(restarted.allowed_tools(&sid()).contains("search"));
    }

    #[tokio::test]
    async fn test_scope_change_orphans_persisted_entries() {
        let db: Arc<MemoryDatabase> = Arc::new(MemoryDatabase::new());
        let bus = Arc::new(EventBus::new());
        let logger = Logger::tracing_only(AgentId::new("test").unwrap(), LogLevel::Error);
        let mut policy = ApprovalPolicy::default();
        policy.cache_storage = CacheStorage::Persistent;

        let manager = ApprovalManager::new(
            policy.clone(),
            Arc::clone(&bus),
            logger.clone(),
            Arc::clone(&db) as Arc<dyn Database>,
            "agent-a",
        );
        manager
            .set_handler(Arc::new(AutoApproveHandler { remember: true }))
            .await;
        manager
            .request_approval(Some(&sid()), "search", &json!({}), &CancelToken::new())
            .await
            .unwrap();

        let renamed = ApprovalManager::new(
            policy,
            bus,
            logger,
            Arc::clone(&db) as Arc<dyn Database>,
            "agent-b",
        );
        assert_eq!(renamed.hydrate_session(&sid()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_elicitation_returns_answer() {
        struct Answerer;
        #[async_trait]
        impl ApprovalHandler for Answerer {
            async fn handle(&self, request: ApprovalRequest) -> HandlerResponse {
                assert_eq!(request.kind, ApprovalKind::Elicitation);
                HandlerResponse::answered("main branch")
            }
        }

        let manager = make_manager(ApprovalPolicy::default());
        manager.set_handler(Arc::new(Answerer)).await;

        let outcome = manager
            .request_elicitation(Some(&sid()), "Which branch?", &CancelToken::new())
            .await
            .unwrap();
        assert!(outcome.is_approved());
        assert_eq!(outcome.answer.as_deref(), Some("main branch"));
    }

    #[tokio::test]
    async fn test_forget_session_clears_caches() {
        let manager = make_manager(ApprovalPolicy::default());
        manager
            .set_handler(Arc::new(AutoApproveHandler { remember: true }))
            .await;
        manager
            .request_approval(Some(&sid()), "search", &json!({}), &CancelToken::new())
            .await
            .unwrap();
        assert!(!manager.allowed_tools(&sid()).is_empty());

        manager.forget_session(&sid());
        assert!(manager.allowed_tools(&sid()).is_empty());
    }
}
