//! Approval policy: mode, static lists, timeout.

use std::collections::HashSet;
use std::time::Duration;

/// How undecided calls are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Ask the registered handler.
    #[default]
    Manual,
    /// Approve everything policy does not deny.
    AutoApprove,
    /// Deny everything policy does not allow.
    AutoDeny,
}

/// Where remembered choices live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheStorage {
    /// In-memory only.
    #[default]
    Memory,
    /// Written through the database; survives agent restart.
    Persistent,
}

/// Per-agent approval policy.
///
/// Precedence over decisions, first match wins:
/// `always_deny > always_allow > session allow-cache > session deny-cache > mode`.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    /// Tools denied unconditionally.
    pub always_deny: HashSet<String>,
    /// Tools approved unconditionally (no handler invoked).
    pub always_allow: HashSet<String>,
    /// Mode for calls nothing else decides.
    pub mode: ApprovalMode,
    /// Handler decision deadline.
    pub timeout: Duration,
    /// Where remembered choices live.
    pub cache_storage: CacheStorage,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            always_deny: HashSet::new(),
            always_allow: HashSet::new(),
            mode: ApprovalMode::Manual,
            timeout: Duration::from_millis(120_000),
            cache_storage: CacheStorage::Memory,
        }
    }
}

impl ApprovalPolicy {
    /// Policy with the given mode and defaults elsewhere.
    #[must_use]
    pub fn with_mode(mode: ApprovalMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}
