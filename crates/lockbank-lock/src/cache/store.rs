//! Key-value store contract used by the cache lock, plus an in-process store

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{LockError, Result};

/// Shared store operations the cache lock relies on
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key` with expiry `ttl` only if the key is absent
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Current value of `key`, if present and not expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key` only if its current value equals `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Delete `key` unconditionally
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Round-trip liveness probe
    async fn ping(&self) -> Result<()>;
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process store with lazy TTL expiry
///
/// Shared between simulated replicas via `Arc`; it can be switched offline
/// to exercise backend fault handling.
pub struct MemoryKvStore {
    entries: DashMap<String, StoredValue>,
    available: AtomicBool,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going offline or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockError::Unavailable("memory store offline".to_string()))
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired() {
                    entry.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(stored);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self
            .entries
            .get(key)
            .filter(|v| !v.is_expired())
            .map(|v| v.value.clone()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self
            .entries
            .remove_if(key, |_, v| !v.is_expired() && v.value == expected)
            .is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired()))
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
