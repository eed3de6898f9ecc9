//! Application startup: logging plus assembly of the lock and ledger stack.

mod logging;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, ROOT_LOG_FILE, init_logging};

use std::sync::Arc;

use lockbank_core::TransferService;
use lockbank_ledger::{MemoryLedger, MemoryTransactionStore};
use lockbank_lock::{
    CacheLockBackend, CacheLockProvider, CoordinationLockBackend, CoordinationLockProvider,
    KvStore, LockManager, LockMetrics, MemoryCoordinationService, MemoryKvStore, RedisKvStore,
};
use tracing::info;

use crate::model::Configuration;

/// Everything one process needs to serve transfers
pub struct Stack {
    pub locks: Arc<LockManager>,
    pub ledger: Arc<MemoryLedger>,
    pub transactions: Arc<MemoryTransactionStore>,
    pub transfers: Arc<TransferService>,
    /// Set when the cache provider runs on the in-process store
    pub memory_store: Option<Arc<MemoryKvStore>>,
    pub coordination: Arc<MemoryCoordinationService>,
}

async fn cache_store(
    configuration: &Configuration,
) -> anyhow::Result<(Arc<dyn KvStore>, Option<Arc<MemoryKvStore>>)> {
    match configuration.redis_url() {
        Some(url) => {
            let store = RedisKvStore::connect(&url).await?;
            info!(url = %url, "Cache lock store connected");
            Ok((Arc::new(store), None))
        }
        None => {
            info!("Cache lock store running in-process");
            let store = Arc::new(MemoryKvStore::new());
            Ok((store.clone(), Some(store)))
        }
    }
}

/// Build both lock providers, the lock manager, the ledger and the transfer service.
pub async fn build_stack(configuration: &Configuration) -> anyhow::Result<Stack> {
    let initial = configuration.lock_provider()?;
    let metrics = Arc::new(LockMetrics::new());

    let (store, memory_store) = cache_store(configuration).await?;
    let cache = CacheLockProvider::new(
        CacheLockBackend::new(store, configuration.cache_lock_config()),
        metrics.clone(),
    );

    let coordination = Arc::new(MemoryCoordinationService::new());
    let coordination_provider = CoordinationLockProvider::new(
        CoordinationLockBackend::new(
            coordination.clone(),
            configuration.coordination_lock_config(),
        ),
        metrics.clone(),
    );

    let locks = Arc::new(
        LockManager::builder()
            .provider(Arc::new(cache))
            .provider(Arc::new(coordination_provider))
            .initial(initial)
            .metrics(metrics)
            .build()?,
    );

    let ledger = Arc::new(MemoryLedger::new());
    let transactions = Arc::new(MemoryTransactionStore::new());
    let transfers = Arc::new(TransferService::new(
        ledger.clone(),
        transactions.clone(),
        locks.clone(),
        configuration.transfer_config(),
    ));

    Ok(Stack {
        locks,
        ledger,
        transactions,
        transfers,
        memory_store,
        coordination,
    })
}

#[cfg(test)]
mod tests {
    use lockbank_lock::ProviderKind;

    use super::*;

    #[tokio::test]
    async fn test_build_in_process_stack() {
        let configuration =
            Configuration::load("does/not/exist.yml", Some("coordination".to_string()), None)
                .unwrap();
        let stack = build_stack(&configuration).await.unwrap();

        assert!(stack.memory_store.is_some());
        assert_eq!(
            stack.locks.current_provider(),
            ProviderKind::CoordinationService
        );
        assert_eq!(stack.locks.configured_providers(), ProviderKind::ALL.to_vec());
        assert_eq!(stack.transfers.config().key_namespace, "account");
    }

    #[tokio::test]
    async fn test_build_rejects_unknown_provider() {
        let configuration =
            Configuration::load("does/not/exist.yml", Some("etcd".to_string()), None).unwrap();
        assert!(build_stack(&configuration).await.is_err());
    }
}
