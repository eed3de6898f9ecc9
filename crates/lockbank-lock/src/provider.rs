//! Lock contract and the managed provider shared by every backend
//!
//! A backend (`LockBackend`) only knows how to talk to its external service:
//! conditional acquire with expiry, token-checked release, and a liveness
//! probe. `ManagedLockProvider` layers the process-side discipline on top:
//! key validation, owner identity, local handle bookkeeping, reentrancy,
//! metrics, and the conversion of backend faults into failure outcomes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::{LockError, Result};
use crate::handle::{HandleRegistry, HoldRelease};
use crate::metrics::LockMetrics;
use crate::model::{FailureReason, LockHandle, ProviderKind};
use crate::owner::current_owner;

/// Raw operations against an external lock service
#[async_trait]
pub trait LockBackend: Send + Sync + 'static {
    /// Provider identity of this backend
    fn kind(&self) -> ProviderKind;

    /// Try to acquire `key` for up to `wait`, with ownership expiring after `lease`
    ///
    /// Returns the holder token on success and `None` on timeout. Dropping the
    /// returned future must not leave a pending claim behind.
    async fn acquire(&self, key: &str, wait: Duration, lease: Duration) -> Result<Option<String>>;

    /// Release `key` only if `token` is still the current holder
    async fn release(&self, key: &str, token: &str) -> Result<bool>;

    /// Whether `token` is the current holder of `key`
    async fn is_holder(&self, key: &str, token: &str) -> Result<bool>;

    /// Whether anyone currently holds `key`
    async fn is_locked(&self, key: &str) -> Result<bool>;

    /// Release `key` regardless of holder
    async fn force_release(&self, key: &str) -> Result<bool>;

    /// Cheap round-trip health probe
    async fn ping(&self) -> Result<()>;
}

/// Distributed lock contract shared by every provider
#[async_trait]
pub trait LockProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Block up to `wait_time` trying to acquire `key`
    ///
    /// Returns `Ok(false)` on timeout or backend fault. Cancellation is
    /// expressed by dropping the future; it is recorded as `interrupted`.
    async fn try_lock(&self, key: &str, wait_time: Duration, lease_time: Duration) -> Result<bool>;

    /// Release `key` if the calling owner holds it
    ///
    /// Returns `Ok(false)` when the caller does not hold the lock; that is a
    /// no-op, not an error.
    async fn unlock(&self, key: &str) -> Result<bool>;

    /// Point-in-time query of the external service; faults read as `false`
    async fn is_locked(&self, key: &str) -> bool;

    /// Whether the calling owner's handle is confirmed by the external service
    async fn is_held_by_current_thread(&self, key: &str) -> bool;

    /// Administrative release regardless of ownership
    async fn force_unlock(&self, key: &str) -> Result<bool>;

    /// Health probe; never fails
    async fn is_available(&self) -> bool;

    /// Whether the calling owner has a local handle for `key`
    fn holds_locally(&self, key: &str) -> bool;

    /// Number of locks tracked in the local handle table
    fn active_lock_count(&self) -> usize;
}

/// Records an `interrupted` failure if an acquisition is dropped mid-wait
struct AcquireGuard<'a> {
    metrics: &'a LockMetrics,
    provider: ProviderKind,
    key: &'a str,
    armed: bool,
}

impl AcquireGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AcquireGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(key = %self.key, provider = %self.provider, "Lock acquisition cancelled while waiting");
            self.metrics
                .record_failure(self.provider, self.key, FailureReason::Interrupted);
        }
    }
}

/// Clears a local handle if a release is dropped before it completes
struct HandleCleanup<'a> {
    handles: &'a HandleRegistry,
    key: &'a str,
    token: &'a str,
    armed: bool,
}

impl Drop for HandleCleanup<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.handles.remove_token(self.key, self.token);
        }
    }
}

/// Lock provider combining a backend with local bookkeeping and metrics
pub struct ManagedLockProvider<B> {
    backend: B,
    handles: HandleRegistry,
    metrics: Arc<LockMetrics>,
}

impl<B: LockBackend> ManagedLockProvider<B> {
    pub fn new(backend: B, metrics: Arc<LockMetrics>) -> Self {
        Self {
            backend,
            handles: HandleRegistry::new(),
            metrics,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn metrics(&self) -> &Arc<LockMetrics> {
        &self.metrics
    }

    /// Re-enter a lock the caller already holds, if the backend still agrees
    async fn try_reenter(&self, key: &str, owner: &str) -> bool {
        let Some(handle) = self.handles.owned_by(key, owner) else {
            return false;
        };

        match self.backend.is_holder(key, &handle.token).await {
            Ok(true) => match self.handles.reenter(key, owner, &handle.token) {
                Some(count) => {
                    debug!(key = %key, owner = %owner, holds = count, "Lock re-entered");
                    true
                }
                None => false,
            },
            Ok(false) => {
                debug!(key = %key, owner = %owner, "Discarding stale lock handle");
                self.handles.remove_token(key, &handle.token);
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to verify lock handle before re-entry");
                self.handles.remove_token(key, &handle.token);
                false
            }
        }
    }
}

#[async_trait]
impl<B: LockBackend> LockProvider for ManagedLockProvider<B> {
    fn kind(&self) -> ProviderKind {
        self.backend.kind()
    }

    async fn try_lock(&self, key: &str, wait_time: Duration, lease_time: Duration) -> Result<bool> {
        if key.is_empty() {
            return Err(LockError::InvalidKey);
        }
        if lease_time.is_zero() {
            return Err(LockError::InvalidLease);
        }

        let provider = self.backend.kind();
        let owner = current_owner();

        self.metrics.record_attempt(provider, key);

        if self.try_reenter(key, &owner).await {
            self.metrics.record_success(provider, key, Duration::ZERO);
            return Ok(true);
        }

        let started = Instant::now();
        let mut guard = AcquireGuard {
            metrics: &self.metrics,
            provider,
            key,
            armed: true,
        };

        let outcome = self.backend.acquire(key, wait_time, lease_time).await;
        guard.disarm();
        let waited = started.elapsed();

        match outcome {
            Ok(Some(token)) => {
                self.handles
                    .insert(LockHandle::new(key, owner.as_str(), token, provider));
                self.metrics.record_success(provider, key, waited);
                debug!(key = %key, owner = %owner, provider = %provider, waited_ms = waited.as_millis() as u64, "Lock acquired");
                Ok(true)
            }
            Ok(None) => {
                self.metrics
                    .record_failure(provider, key, FailureReason::Timeout);
                debug!(key = %key, owner = %owner, provider = %provider, "Lock acquisition timed out");
                Ok(false)
            }
            Err(e) => {
                self.metrics
                    .record_failure(provider, key, FailureReason::Exception);
                error!(key = %key, provider = %provider, error = %e, "Lock acquisition failed");
                Ok(false)
            }
        }
    }

    async fn unlock(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Err(LockError::InvalidKey);
        }

        let provider = self.backend.kind();
        let owner = current_owner();

        let Some(handle) = self.handles.owned_by(key, &owner) else {
            self.metrics
                .record_failure(provider, key, FailureReason::NotHeldByCurrentThread);
            debug!(key = %key, owner = %owner, "Unlock ignored: lock not held by caller");
            return Ok(false);
        };

        let mut cleanup = HandleCleanup {
            handles: &self.handles,
            key,
            token: &handle.token,
            armed: true,
        };

        match self.backend.is_holder(key, &handle.token).await {
            Ok(true) => {}
            Ok(false) => {
                // Lease expired and the key may already belong to someone else
                self.metrics
                    .record_failure(provider, key, FailureReason::NotHeldByCurrentThread);
                warn!(key = %key, owner = %owner, "Unlock ignored: lock ownership lost");
                return Ok(false);
            }
            Err(e) => {
                self.metrics
                    .record_failure(provider, key, FailureReason::Exception);
                error!(key = %key, error = %e, "Failed to verify lock ownership on unlock");
                return Ok(false);
            }
        }

        match self.handles.release_hold(key, &owner) {
            HoldRelease::Nested(remaining) => {
                cleanup.armed = false;
                debug!(key = %key, owner = %owner, holds = remaining, "Reentrant hold released");
                return Ok(true);
            }
            HoldRelease::NotHeld => {
                self.metrics
                    .record_failure(provider, key, FailureReason::NotHeldByCurrentThread);
                return Ok(false);
            }
            HoldRelease::Last => {}
        }

        match self.backend.release(key, &handle.token).await {
            Ok(true) => {
                self.metrics
                    .record_release(provider, key, handle.acquired_instant.elapsed());
                debug!(key = %key, owner = %owner, provider = %provider, "Lock released");
                Ok(true)
            }
            Ok(false) => {
                self.metrics
                    .record_failure(provider, key, FailureReason::NotHeldByCurrentThread);
                warn!(key = %key, owner = %owner, "Lock expired before release");
                Ok(false)
            }
            Err(e) => {
                self.metrics
                    .record_failure(provider, key, FailureReason::Exception);
                error!(key = %key, provider = %provider, error = %e, "Lock release failed");
                Ok(false)
            }
        }
    }

    async fn is_locked(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        match self.backend.is_locked(key).await {
            Ok(locked) => locked,
            Err(e) => {
                warn!(key = %key, provider = %self.backend.kind(), error = %e, "Lock status query failed");
                false
            }
        }
    }

    async fn is_held_by_current_thread(&self, key: &str) -> bool {
        let Some(handle) = self.handles.owned_by(key, &current_owner()) else {
            return false;
        };
        match self.backend.is_holder(key, &handle.token).await {
            Ok(held) => held,
            Err(e) => {
                warn!(key = %key, provider = %self.backend.kind(), error = %e, "Lock ownership query failed");
                false
            }
        }
    }

    async fn force_unlock(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Err(LockError::InvalidKey);
        }

        let provider = self.backend.kind();
        warn!(
            key = %key,
            provider = %provider,
            caller = %current_owner(),
            "FORCE UNLOCK requested: releasing lock regardless of ownership"
        );

        self.handles.remove(key);
        let released = self.backend.force_release(key).await?;
        self.metrics.record_force_release(provider, key);
        Ok(released)
    }

    async fn is_available(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!(provider = %self.backend.kind(), error = %e, "Lock provider health probe failed");
                false
            }
        }
    }

    fn holds_locally(&self, key: &str) -> bool {
        self.handles.owned_by(key, &current_owner()).is_some()
    }

    fn active_lock_count(&self) -> usize {
        self.handles.len()
    }
}
