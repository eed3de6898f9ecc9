//! LockBank Lock - pluggable distributed locking
//!
//! This crate provides:
//! - The lock contract shared by every provider (`LockProvider`)
//! - Local lock-handle bookkeeping and owner identity scopes
//! - Lock metrics (local snapshots plus the `metrics` facade)
//! - A cache-based provider (TTL key with holder token, compare-and-delete release)
//! - A coordination-service provider (ephemeral sequential nodes)
//! - `LockManager`, the runtime-switchable facade over the configured providers

pub mod cache;
pub mod coordination;
pub mod error;
pub mod handle;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod owner;
pub mod provider;

// Re-export commonly used types
pub use cache::{CacheLockBackend, CacheLockConfig, KvStore, MemoryKvStore, RedisKvStore};
pub use coordination::{
    CoordinationClient, CoordinationLockBackend, CoordinationLockConfig,
    MemoryCoordinationService,
};
pub use error::{LockError, Result};
pub use handle::HandleRegistry;
pub use manager::{LockManager, LockManagerBuilder, ProviderSelection};
pub use metrics::LockMetrics;
pub use model::{
    FailureReason, LockHandle, LockStatistics, ProviderKind, ProviderMetricsSnapshot,
    ProviderState, ProviderStatus,
};
pub use owner::{current_owner, with_lock_owner};
pub use provider::{LockBackend, LockProvider, ManagedLockProvider};

/// Provider backed by a shared key-value store
pub type CacheLockProvider = ManagedLockProvider<CacheLockBackend>;

/// Provider backed by a hierarchical coordination service
pub type CoordinationLockProvider = ManagedLockProvider<CoordinationLockBackend>;
