//! Lock manager
//!
//! Holds one instance of every configured provider and a pointer to the
//! active one. The pointer is swapped atomically; each operation reads it
//! exactly once, so an operation that started on one provider finishes on
//! it even if the active provider changes mid-flight.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::error::{LockError, Result};
use crate::metrics::LockMetrics;
use crate::model::{LockStatistics, ProviderKind, ProviderState, ProviderStatus};
use crate::provider::LockProvider;

/// Provider chosen at one point in time, together with its identity
pub struct ProviderSelection {
    pub kind: ProviderKind,
    pub provider: Arc<dyn LockProvider>,
}

/// Builder for [`LockManager`]
pub struct LockManagerBuilder {
    providers: BTreeMap<ProviderKind, Arc<dyn LockProvider>>,
    initial: ProviderKind,
    metrics: Arc<LockMetrics>,
}

impl LockManagerBuilder {
    /// Register a provider; a later registration of the same kind replaces it
    pub fn provider(mut self, provider: Arc<dyn LockProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn initial(mut self, kind: ProviderKind) -> Self {
        self.initial = kind;
        self
    }

    /// Metrics recorder shared with the registered providers
    pub fn metrics(mut self, metrics: Arc<LockMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Result<LockManager> {
        let provider = self
            .providers
            .get(&self.initial)
            .cloned()
            .ok_or_else(|| LockError::UnsupportedProvider(self.initial.to_string()))?;

        info!(
            provider = %self.initial,
            configured = ?self.providers.keys().collect::<Vec<_>>(),
            "Lock manager initialized"
        );

        Ok(LockManager {
            active: ArcSwap::from_pointee(ProviderSelection {
                kind: self.initial,
                provider,
            }),
            providers: self.providers,
            metrics: self.metrics,
        })
    }
}

/// Runtime-switchable facade over the configured lock providers
pub struct LockManager {
    providers: BTreeMap<ProviderKind, Arc<dyn LockProvider>>,
    active: ArcSwap<ProviderSelection>,
    metrics: Arc<LockMetrics>,
}

impl LockManager {
    pub fn builder() -> LockManagerBuilder {
        LockManagerBuilder {
            providers: BTreeMap::new(),
            initial: ProviderKind::Cache,
            metrics: Arc::new(LockMetrics::new()),
        }
    }

    pub fn current_provider(&self) -> ProviderKind {
        self.active.load().kind
    }

    /// Snapshot of the active provider
    ///
    /// An operation touching several keys acquires and releases all of them
    /// through one pinned selection, so a concurrent switch cannot split its
    /// locks across providers.
    pub fn pin(&self) -> Arc<ProviderSelection> {
        self.active.load_full()
    }

    /// Configured provider instance of `kind`
    pub fn provider(&self, kind: ProviderKind) -> Option<Arc<dyn LockProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }

    pub fn metrics(&self) -> &Arc<LockMetrics> {
        &self.metrics
    }

    /// Make `kind` the active provider for subsequent operations
    ///
    /// Returns `Ok(false)` and keeps the current provider if the target fails
    /// its health probe. Locks held through the previous provider stay valid
    /// and are released through it.
    pub async fn switch_provider(&self, kind: ProviderKind) -> Result<bool> {
        let provider = self
            .provider(kind)
            .ok_or_else(|| LockError::UnsupportedProvider(kind.to_string()))?;

        if !provider.is_available().await {
            warn!(provider = %kind, "Provider switch rejected: target unavailable");
            return Ok(false);
        }

        let previous = self.active.swap(Arc::new(ProviderSelection { kind, provider }));
        info!(from = %previous.kind, to = %kind, "Lock provider switched");
        Ok(true)
    }

    /// Health probe of a configured provider; unknown kinds read as unavailable
    pub async fn is_provider_available(&self, kind: ProviderKind) -> bool {
        match self.provider(kind) {
            Some(provider) => provider.is_available().await,
            None => false,
        }
    }

    pub async fn try_lock(&self, key: &str, wait_time: Duration, lease_time: Duration) -> Result<bool> {
        let selection = self.active.load_full();
        selection.provider.try_lock(key, wait_time, lease_time).await
    }

    /// Release through whichever provider granted the caller's lock
    pub async fn unlock(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Err(LockError::InvalidKey);
        }
        let selection = self.active.load_full();
        if selection.provider.holds_locally(key) {
            return selection.provider.unlock(key).await;
        }
        if let Some(provider) = self
            .providers
            .iter()
            .filter(|(kind, _)| **kind != selection.kind)
            .map(|(_, provider)| provider)
            .find(|provider| provider.holds_locally(key))
        {
            return provider.unlock(key).await;
        }
        selection.provider.unlock(key).await
    }

    pub async fn is_locked(&self, key: &str) -> bool {
        let selection = self.active.load_full();
        selection.provider.is_locked(key).await
    }

    /// Whether the caller holds `key` through any configured provider
    pub async fn is_held_by_current_thread(&self, key: &str) -> bool {
        for provider in self.providers.values() {
            if provider.holds_locally(key) && provider.is_held_by_current_thread(key).await {
                return true;
            }
        }
        false
    }

    /// Administrative release through the active provider
    pub async fn force_unlock(&self, key: &str) -> Result<bool> {
        let selection = self.active.load_full();
        selection.provider.force_unlock(key).await
    }

    /// Administrative release through a specific provider
    pub async fn force_unlock_with(&self, kind: ProviderKind, key: &str) -> Result<bool> {
        let provider = self
            .provider(kind)
            .ok_or_else(|| LockError::UnsupportedProvider(kind.to_string()))?;
        provider.force_unlock(key).await
    }

    pub async fn provider_status(&self) -> ProviderStatus {
        let current = self.current_provider();
        let mut providers = Vec::with_capacity(self.providers.len());
        for (kind, provider) in &self.providers {
            providers.push(ProviderState {
                provider: *kind,
                available: provider.is_available().await,
                active: *kind == current,
                local_locks: provider.active_lock_count(),
            });
        }
        ProviderStatus {
            current_provider: current,
            providers,
        }
    }

    pub fn lock_statistics(&self) -> LockStatistics {
        LockStatistics {
            current_provider: self.current_provider(),
            providers: self
                .providers
                .iter()
                .map(|(kind, provider)| {
                    let mut snapshot = self.metrics.snapshot(*kind);
                    snapshot.active_locks = provider.active_lock_count();
                    snapshot
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheLockBackend, CacheLockConfig, MemoryKvStore};
    use crate::coordination::{
        CoordinationLockBackend, CoordinationLockConfig, MemoryCoordinationService,
    };
    use crate::provider::ManagedLockProvider;

    const WAIT: Duration = Duration::from_millis(50);
    const LEASE: Duration = Duration::from_secs(10);

    struct Fixture {
        manager: LockManager,
        store: Arc<MemoryKvStore>,
        service: Arc<MemoryCoordinationService>,
    }

    fn fixture() -> Fixture {
        let metrics = Arc::new(LockMetrics::new());
        let store = Arc::new(MemoryKvStore::new());
        let service = Arc::new(MemoryCoordinationService::new());
        let cache = ManagedLockProvider::new(
            CacheLockBackend::new(store.clone(), CacheLockConfig::default()),
            metrics.clone(),
        );
        let coordination = ManagedLockProvider::new(
            CoordinationLockBackend::new(service.clone(), CoordinationLockConfig::default()),
            metrics.clone(),
        );
        let manager = LockManager::builder()
            .provider(Arc::new(cache))
            .provider(Arc::new(coordination))
            .metrics(metrics)
            .initial(ProviderKind::Cache)
            .build()
            .unwrap();
        Fixture {
            manager,
            store,
            service,
        }
    }

    #[test]
    fn test_build_requires_initial_provider() {
        let result = LockManager::builder()
            .initial(ProviderKind::CoordinationService)
            .build();
        assert!(matches!(result, Err(LockError::UnsupportedProvider(_))));
    }

    #[tokio::test]
    async fn test_switch_to_available_provider() {
        let f = fixture();
        assert_eq!(f.manager.current_provider(), ProviderKind::Cache);

        assert!(
            f.manager
                .switch_provider(ProviderKind::CoordinationService)
                .await
                .unwrap()
        );
        assert_eq!(f.manager.current_provider(), ProviderKind::CoordinationService);
    }

    #[tokio::test]
    async fn test_switch_to_unavailable_provider_is_rejected() {
        let f = fixture();
        f.service.set_available(false);

        assert!(
            !f.manager
                .switch_provider(ProviderKind::CoordinationService)
                .await
                .unwrap()
        );
        assert_eq!(f.manager.current_provider(), ProviderKind::Cache);
        assert!(!f.manager.is_provider_available(ProviderKind::CoordinationService).await);
        assert!(f.manager.is_provider_available(ProviderKind::Cache).await);
    }

    #[tokio::test]
    async fn test_lock_held_before_switch_releases_through_original_provider() {
        let f = fixture();
        assert!(f.manager.try_lock("account:A", WAIT, LEASE).await.unwrap());

        f.manager
            .switch_provider(ProviderKind::CoordinationService)
            .await
            .unwrap();

        assert!(f.manager.is_held_by_current_thread("account:A").await);
        assert!(f.manager.unlock("account:A").await.unwrap());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_pinned_selection_outlives_switch() {
        let f = fixture();
        let pinned = f.manager.pin();
        assert!(pinned.provider.try_lock("account:A", WAIT, LEASE).await.unwrap());

        f.manager
            .switch_provider(ProviderKind::CoordinationService)
            .await
            .unwrap();

        assert_eq!(pinned.kind, ProviderKind::Cache);
        assert!(pinned.provider.try_lock("account:B", WAIT, LEASE).await.unwrap());
        assert_eq!(f.store.len(), 2);
        assert_eq!(f.service.parent_count(), 0);

        assert!(pinned.provider.unlock("account:B").await.unwrap());
        assert!(pinned.provider.unlock("account:A").await.unwrap());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_unlock_without_holding_returns_false() {
        let f = fixture();
        assert!(!f.manager.unlock("account:A").await.unwrap());
        assert!(matches!(
            f.manager.unlock("").await,
            Err(LockError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn test_status_and_statistics() {
        let f = fixture();
        f.manager.try_lock("k", WAIT, LEASE).await.unwrap();

        let status = f.manager.provider_status().await;
        assert_eq!(status.current_provider, ProviderKind::Cache);
        assert_eq!(status.providers.len(), 2);
        let cache = status
            .providers
            .iter()
            .find(|p| p.provider == ProviderKind::Cache)
            .unwrap();
        assert!(cache.active);
        assert_eq!(cache.local_locks, 1);

        let stats = f.manager.lock_statistics();
        let cache = stats.provider(ProviderKind::Cache).unwrap();
        assert_eq!(cache.attempts, 1);
        assert_eq!(cache.successes, 1);
        assert_eq!(cache.active_locks, 1);
    }

    #[tokio::test]
    async fn test_force_unlock_with_specific_provider() {
        let f = fixture();
        f.manager
            .switch_provider(ProviderKind::CoordinationService)
            .await
            .unwrap();
        assert!(f.manager.try_lock("k", WAIT, LEASE).await.unwrap());

        assert!(
            f.manager
                .force_unlock_with(ProviderKind::CoordinationService, "k")
                .await
                .unwrap()
        );
        assert!(!f.manager.is_locked("k").await);
    }
}
