//! Bounded session table with single-writer semantics.

use dashmap::DashMap;
use dexto_core::SessionId;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::services::SessionServices;
use crate::session::ChatSession;
use crate::state::RunState;
use crate::store::SessionRecord;

/// Creates, loads, and evicts [`ChatSession`]s under the configured
/// limits.
///
/// Invariants:
/// - at most `max_sessions` sessions live in memory; exceeding the cap on
///   create evicts the least-recently-active *idle* session (persistence
///   is write-through, so eviction just drops the memory copy)
/// - a session with an active run is never evicted
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<ChatSession>>,
    services: Arc<SessionServices>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a session manager.
    #[must_use]
    pub fn new(services: Arc<SessionServices>) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            services,
            sweeper: std::sync::Mutex::new(None),
        })
    }

    /// Number of sessions currently in memory.
    #[must_use]
    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    /// Get a live session, lazily loading a persisted one; create it if
    /// it exists nowhere.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::SessionLimit`] when the table is full and
    /// every resident session is running.
    pub async fn get_or_create(&self, id: &SessionId) -> RuntimeResult<Arc<ChatSession>> {
        if let Some(session) = self.sessions.get(id).map(|e| Arc::clone(e.value())) {
            return Ok(session);
        }

        // Lazy-load from storage, else fresh.
        let session = match self.services.store.load_record(id).await? {
            Some(record) => {
                let messages = self.services.store.load_messages(id).await?;
                debug!(session_id = %id, messages = messages.len(), "Session loaded from storage");
                let session =
                    ChatSession::from_storage(record, messages, Arc::clone(&self.services));
                let _ = self.services.approvals.hydrate_session(id).await;
                session
            },
            None => {
                let session = ChatSession::new(id.clone(), Arc::clone(&self.services));
                self.services
                    .store
                    .save_record(&session.record().await)
                    .await?;
                session
            },
        };

        self.make_room().await?;
        self.sessions.insert(id.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// Create a session, generating an id when the caller supplies none.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_or_create`](Self::get_or_create).
    pub async fn create(&self, id: Option<SessionId>) -> RuntimeResult<SessionId> {
        let id = id.unwrap_or_else(SessionId::generate);
        self.get_or_create(&id).await?;
        Ok(id)
    }

    /// Get a live or persisted session without creating one.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn get(&self, id: &SessionId) -> RuntimeResult<Option<Arc<ChatSession>>> {
        if let Some(session) = self.sessions.get(id).map(|e| Arc::clone(e.value())) {
            return Ok(Some(session));
        }
        if self.services.store.load_record(id).await?.is_some() {
            return Ok(Some(self.get_or_create(id).await?));
        }
        Ok(None)
    }

    /// Evict the least-recently-active idle session if the table is full.
    async fn make_room(&self) -> RuntimeResult<()> {
        let limit = self.services.session_config.max_sessions;
        if self.sessions.len() < limit {
            return Ok(());
        }

        let resident: Vec<(SessionId, Arc<ChatSession>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut candidate: Option<(SessionId, dexto_core::Timestamp)> = None;
        for (id, session) in resident {
            if session.run_state().await != RunState::Idle {
                continue;
            }
            let activity = session.last_activity().await;
            if candidate
                .as_ref()
                .is_none_or(|(_, oldest)| activity < *oldest)
            {
                candidate = Some((id, activity));
            }
        }

        let Some((evict_id, _)) = candidate else {
            return Err(RuntimeError::SessionLimit { limit });
        };
        debug!(session_id = %evict_id, "Evicting idle session (table full)");
        self.sessions.remove(&evict_id);
        Ok(())
    }

    /// All persisted session records, whether or not resident.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn list(&self) -> RuntimeResult<Vec<SessionRecord>> {
        self.services.store.list_records().await
    }

    /// Delete a session: cancel any running run, drop it from memory, and
    /// remove it from storage.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn delete(&self, id: &SessionId) -> RuntimeResult<()> {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.cancel().await;
        }
        self.services.approvals.forget_session(id);
        self.services.store.delete_session(id).await?;
        Ok(())
    }

    /// Cancel every resident session's active run (agent stop).
    pub async fn cancel_all(&self) {
        let resident: Vec<Arc<ChatSession>> = self
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for session in resident {
            session.cancel().await;
        }
    }

    /// Sessions with an active run.
    pub async fn active_sessions(&self) -> Vec<SessionId> {
        let resident: Vec<(SessionId, Arc<ChatSession>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut active = Vec::new();
        for (id, session) in resident {
            if session.run_state().await != RunState::Idle {
                active.push(id);
            }
        }
        active
    }

    /// Start the idle-TTL sweeper.
    pub fn start_sweeper(self: &Arc<Self>) {
        let ttl = Duration::from_millis(self.services.session_config.session_ttl_ms);
        let interval = (ttl / 4).max(Duration::from_secs(1));
        let manager = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                manager.sweep_expired(ttl).await;
            }
        });
        let mut guard = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(old) = guard.replace(handle) {
            old.abort();
        }
    }

    /// Stop the idle-TTL sweeper.
    pub fn stop_sweeper(&self) {
        let mut guard = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    /// Evict idle sessions whose last activity is older than `ttl`.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let resident: Vec<(SessionId, Arc<ChatSession>)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut evicted = 0;
        for (id, session) in resident {
            if session.run_state().await != RunState::Idle {
                continue;
            }
            if session.last_activity().await.elapsed() >= ttl {
                self.services.logger.debug(
                    "Evicting session past idle TTL",
                    Some(json!({"session_id": id.to_string()})),
                );
                self.sessions.remove(&id);
                evicted += 1;
            }
        }
        evicted
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("resident", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
