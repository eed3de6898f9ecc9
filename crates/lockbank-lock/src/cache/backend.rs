use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::store::KvStore;
use crate::error::Result;
use crate::model::ProviderKind;
use crate::provider::LockBackend;

/// Cache lock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheLockConfig {
    /// Prefix prepended to every lock key in the store
    pub key_prefix: String,
    /// First retry delay while waiting for a held key
    pub retry_interval: Duration,
    /// Upper bound for the retry delay
    pub max_retry_interval: Duration,
    /// Growth factor applied to the retry delay after each miss
    pub backoff_multiplier: f64,
}

impl Default for CacheLockConfig {
    fn default() -> Self {
        Self {
            key_prefix: "lock:".to_string(),
            retry_interval: Duration::from_millis(10),
            max_retry_interval: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        }
    }
}

impl CacheLockConfig {
    fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.mul_f64(self.backoff_multiplier.max(1.0));
        grown.min(self.max_retry_interval)
    }
}

/// Lock backend storing `prefix + key -> token` with TTL = lease
pub struct CacheLockBackend {
    store: Arc<dyn KvStore>,
    config: CacheLockConfig,
}

impl CacheLockBackend {
    pub fn new(store: Arc<dyn KvStore>, config: CacheLockConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheLockConfig {
        &self.config
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl LockBackend for CacheLockBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cache
    }

    async fn acquire(&self, key: &str, wait: Duration, lease: Duration) -> Result<Option<String>> {
        let store_key = self.store_key(key);
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;
        let mut delay = self.config.retry_interval.max(Duration::from_millis(1));

        loop {
            if self.store.set_if_absent(&store_key, &token, lease).await? {
                return Ok(Some(token));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let pause = delay.min(deadline - now);
            trace!(key = %key, pause_ms = pause.as_millis() as u64, "Cache lock busy, retrying");
            tokio::time::sleep(pause).await;
            delay = self.config.next_delay(delay);
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        self.store
            .compare_and_delete(&self.store_key(key), token)
            .await
    }

    async fn is_holder(&self, key: &str, token: &str) -> Result<bool> {
        let current = self.store.get(&self.store_key(key)).await?;
        Ok(current.as_deref() == Some(token))
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        Ok(self.store.get(&self.store_key(key)).await?.is_some())
    }

    async fn force_release(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.store_key(key)).await
    }

    async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;

    fn backend(store: Arc<MemoryKvStore>) -> CacheLockBackend {
        CacheLockBackend::new(store, CacheLockConfig::default())
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = CacheLockConfig::default();
        let mut delay = config.retry_interval;
        for _ in 0..10 {
            delay = config.next_delay(delay);
        }
        assert_eq!(delay, config.max_retry_interval);
        assert_eq!(
            config.next_delay(Duration::from_millis(10)),
            Duration::from_millis(20)
        );
    }

    #[tokio::test]
    async fn test_acquire_writes_prefixed_key() {
        let store = Arc::new(MemoryKvStore::new());
        let backend = backend(store.clone());

        let token = backend
            .acquire("account:ACC001", Duration::ZERO, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            store.get("lock:account:ACC001").await.unwrap(),
            Some(token.clone())
        );
        assert!(backend.is_holder("account:ACC001", &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_wait_on_held_key_times_out_immediately() {
        let store = Arc::new(MemoryKvStore::new());
        let backend = backend(store);
        let lease = Duration::from_secs(5);

        backend.acquire("k", Duration::ZERO, lease).await.unwrap();
        let started = Instant::now();
        let second = backend.acquire("k", Duration::ZERO, lease).await.unwrap();

        assert!(second.is_none());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_release_requires_matching_token() {
        let store = Arc::new(MemoryKvStore::new());
        let backend = backend(store);
        let token = backend
            .acquire("k", Duration::ZERO, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert!(!backend.release("k", "someone-else").await.unwrap());
        assert!(backend.is_locked("k").await.unwrap());
        assert!(backend.release("k", &token).await.unwrap());
        assert!(!backend.is_locked("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_lease_expiry() {
        let store = Arc::new(MemoryKvStore::new());
        let backend = backend(store);

        backend
            .acquire("k", Duration::ZERO, Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();
        let token = backend
            .acquire("k", Duration::from_secs(1), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(token.is_some());
    }

    #[tokio::test]
    async fn test_store_fault_propagates() {
        let store = Arc::new(MemoryKvStore::new());
        let backend = backend(store.clone());
        store.set_available(false);

        assert!(
            backend
                .acquire("k", Duration::ZERO, Duration::from_secs(1))
                .await
                .is_err()
        );
        assert!(backend.ping().await.is_err());
    }
}
