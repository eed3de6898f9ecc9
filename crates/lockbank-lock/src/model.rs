//! Lock data model

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::LockError;

/// Identity of a lock provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// TTL key in a shared fast store
    Cache,
    /// Ephemeral sequential node in a hierarchical coordination service
    CoordinationService,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Cache, ProviderKind::CoordinationService];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Cache => "cache",
            ProviderKind::CoordinationService => "coordination-service",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cache" | "redis" => Ok(ProviderKind::Cache),
            "coordination-service" | "coordination" | "zookeeper" => {
                Ok(ProviderKind::CoordinationService)
            }
            other => Err(LockError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Reason tag attached to a failed lock operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureReason {
    Timeout,
    Interrupted,
    Exception,
    NotHeldByCurrentThread,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Interrupted => "interrupted",
            FailureReason::Exception => "exception",
            FailureReason::NotHeldByCurrentThread => "not_held_by_current_thread",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ownership record for a lock acquired by this process
///
/// Lives only in the local handle table. The external service stays
/// authoritative; a handle is re-verified against it before any release.
#[derive(Debug, Clone)]
pub struct LockHandle {
    /// Lock key
    pub key: String,
    /// Owner identity of the acquiring task
    pub owner: String,
    /// Holder token issued by the provider backend
    pub token: String,
    /// Provider that granted the lock
    pub provider: ProviderKind,
    /// Acquisition timestamp (Unix millis)
    pub acquired_at: i64,
    /// Monotonic acquisition instant, used for hold-time metrics
    pub acquired_instant: Instant,
    /// Reentrant hold count
    pub hold_count: u32,
}

impl LockHandle {
    pub fn new(
        key: impl Into<String>,
        owner: impl Into<String>,
        token: impl Into<String>,
        provider: ProviderKind,
    ) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            token: token.into(),
            provider,
            acquired_at: lockbank_common::current_timestamp(),
            acquired_instant: Instant::now(),
            hold_count: 1,
        }
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}

/// Per-provider metric snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetricsSnapshot {
    pub provider: String,
    pub attempts: u64,
    pub successes: u64,
    pub failures: BTreeMap<String, u64>,
    pub releases: u64,
    pub force_releases: u64,
    pub avg_wait_ms: f64,
    pub avg_hold_ms: f64,
    /// Locks currently tracked in the provider's local handle table
    pub active_locks: usize,
}

impl ProviderMetricsSnapshot {
    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn failures_for(&self, reason: FailureReason) -> u64 {
        self.failures.get(reason.as_str()).copied().unwrap_or(0)
    }
}

/// Lock statistics across all configured providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatistics {
    pub current_provider: ProviderKind,
    pub providers: Vec<ProviderMetricsSnapshot>,
}

impl LockStatistics {
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderMetricsSnapshot> {
        self.providers.iter().find(|p| p.provider == kind.as_str())
    }
}

/// Health and activity of a single configured provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderState {
    pub provider: ProviderKind,
    pub available: bool,
    pub active: bool,
    pub local_locks: usize,
}

/// Snapshot of the provider switch state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub current_provider: ProviderKind,
    pub providers: Vec<ProviderState>,
}
