// Integration tests for the lock provider contract
// Every scenario runs against both providers, with separate provider
// instances standing in for separate service replicas.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lockbank_lock::{
    CacheLockBackend, CacheLockConfig, CoordinationLockBackend, CoordinationLockConfig,
    FailureReason, LockMetrics, LockProvider, ManagedLockProvider, MemoryCoordinationService,
    MemoryKvStore, ProviderKind, with_lock_owner,
};

const LEASE: Duration = Duration::from_secs(10);

/// Shared external service plus a way to mint replicas against it
struct Cluster {
    store: Arc<MemoryKvStore>,
    service: Arc<MemoryCoordinationService>,
}

impl Cluster {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryKvStore::new()),
            service: Arc::new(MemoryCoordinationService::new()),
        }
    }

    fn replica(&self, kind: ProviderKind, metrics: Arc<LockMetrics>) -> Arc<dyn LockProvider> {
        match kind {
            ProviderKind::Cache => Arc::new(ManagedLockProvider::new(
                CacheLockBackend::new(self.store.clone(), CacheLockConfig::default()),
                metrics,
            )),
            ProviderKind::CoordinationService => Arc::new(ManagedLockProvider::new(
                CoordinationLockBackend::new(
                    self.service.clone(),
                    CoordinationLockConfig::default(),
                ),
                metrics,
            )),
        }
    }

    fn set_available(&self, kind: ProviderKind, available: bool) {
        match kind {
            ProviderKind::Cache => self.store.set_available(available),
            ProviderKind::CoordinationService => self.service.set_available(available),
        }
    }
}

#[tokio::test]
async fn test_second_replica_times_out_while_lock_held() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let a = cluster.replica(kind, metrics.clone());
        let b = cluster.replica(kind, metrics.clone());

        assert!(
            with_lock_owner("a", a.try_lock("k", Duration::ZERO, LEASE))
                .await
                .unwrap()
        );
        let acquired = with_lock_owner("b", b.try_lock("k", Duration::from_millis(50), LEASE))
            .await
            .unwrap();

        assert!(!acquired, "{kind}: second replica must not acquire");
        assert_eq!(metrics.snapshot(kind).failures_for(FailureReason::Timeout), 1);
        assert!(b.is_locked("k").await);
    }
}

#[tokio::test]
async fn test_waiter_acquires_after_release() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let a = cluster.replica(kind, metrics.clone());
        let b = cluster.replica(kind, metrics.clone());

        with_lock_owner("a", a.try_lock("k", Duration::ZERO, LEASE))
            .await
            .unwrap();

        let waiter = {
            let b = b.clone();
            tokio::spawn(with_lock_owner("b", async move {
                b.try_lock("k", Duration::from_secs(2), LEASE).await
            }))
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(with_lock_owner("a", a.unlock("k")).await.unwrap());

        assert!(waiter.await.unwrap().unwrap(), "{kind}: waiter must acquire");
    }
}

#[tokio::test]
async fn test_waiter_with_lease_shorter_than_wait_is_promoted() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let a = cluster.replica(kind, metrics.clone());
        let b = cluster.replica(kind, metrics.clone());

        assert!(
            with_lock_owner("a", a.try_lock("k", Duration::ZERO, LEASE))
                .await
                .unwrap()
        );

        let waiter = {
            let b = b.clone();
            tokio::spawn(with_lock_owner("b", async move {
                b.try_lock("k", Duration::from_secs(2), Duration::from_millis(100))
                    .await
            }))
        };
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(with_lock_owner("a", a.unlock("k")).await.unwrap());

        assert!(
            waiter.await.unwrap().unwrap(),
            "{kind}: waiter must acquire within its wait time"
        );
        let snapshot = metrics.snapshot(kind);
        assert_eq!(snapshot.failures_for(FailureReason::Exception), 0);
        assert_eq!(snapshot.failures_for(FailureReason::Timeout), 0);
    }
}

#[tokio::test]
async fn test_lease_expiry_lets_other_replica_in() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let a = cluster.replica(kind, metrics.clone());
        let b = cluster.replica(kind, metrics.clone());

        assert!(
            with_lock_owner("a", a.try_lock("k", Duration::ZERO, Duration::from_millis(40)))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(
            with_lock_owner("b", b.try_lock("k", Duration::ZERO, LEASE))
                .await
                .unwrap(),
            "{kind}: lock must be free after lease expiry"
        );

        // The stale holder's unlock must not release b's lock
        assert!(!with_lock_owner("a", a.unlock("k")).await.unwrap());
        assert!(with_lock_owner("b", b.is_held_by_current_thread("k")).await);
        assert_eq!(
            metrics
                .snapshot(kind)
                .failures_for(FailureReason::NotHeldByCurrentThread),
            1
        );
    }
}

#[tokio::test]
async fn test_reentrant_hold_needs_matching_unlocks() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let provider = cluster.replica(kind, Arc::new(LockMetrics::new()));

        with_lock_owner("owner", async {
            assert!(provider.try_lock("k", Duration::ZERO, LEASE).await.unwrap());
            assert!(provider.try_lock("k", Duration::ZERO, LEASE).await.unwrap());

            assert!(provider.unlock("k").await.unwrap());
            assert!(provider.is_locked("k").await, "{kind}: still held once");
            assert!(provider.unlock("k").await.unwrap());
            assert!(!provider.is_locked("k").await);
        })
        .await;
    }
}

#[tokio::test]
async fn test_unlock_by_non_holder_is_noop() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let provider = cluster.replica(kind, Arc::new(LockMetrics::new()));

        with_lock_owner("holder", provider.try_lock("k", Duration::ZERO, LEASE))
            .await
            .unwrap();

        assert!(!with_lock_owner("intruder", provider.unlock("k")).await.unwrap());
        assert!(provider.is_locked("k").await);
        assert!(!with_lock_owner("intruder", provider.is_held_by_current_thread("k")).await);
        assert!(with_lock_owner("holder", provider.is_held_by_current_thread("k")).await);
    }
}

#[tokio::test]
async fn test_backend_fault_reads_as_failure() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let provider = cluster.replica(kind, metrics.clone());
        cluster.set_available(kind, false);

        assert!(!provider.is_available().await);
        assert!(!provider.try_lock("k", Duration::ZERO, LEASE).await.unwrap());
        assert!(!provider.is_locked("k").await);
        assert_eq!(metrics.snapshot(kind).failures_for(FailureReason::Exception), 1);

        cluster.set_available(kind, true);
        assert!(provider.is_available().await);
    }
}

#[tokio::test]
async fn test_cancelled_wait_records_interrupted() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let a = cluster.replica(kind, metrics.clone());
        let b = cluster.replica(kind, metrics.clone());

        with_lock_owner("a", a.try_lock("k", Duration::ZERO, LEASE))
            .await
            .unwrap();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(30),
            with_lock_owner("b", b.try_lock("k", Duration::from_secs(5), LEASE)),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(
            metrics.snapshot(kind).failures_for(FailureReason::Interrupted),
            1
        );
        assert_eq!(b.active_lock_count(), 0);

        // The abandoned waiter must not block the next acquisition
        with_lock_owner("a", a.unlock("k")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(
            with_lock_owner("c", b.try_lock("k", Duration::from_millis(500), LEASE))
                .await
                .unwrap()
        );
    }
}

#[tokio::test]
async fn test_force_unlock_ignores_ownership() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let a = cluster.replica(kind, metrics.clone());
        let admin = cluster.replica(kind, metrics.clone());

        with_lock_owner("a", a.try_lock("k", Duration::ZERO, LEASE))
            .await
            .unwrap();

        assert!(admin.force_unlock("k").await.unwrap());
        assert!(!admin.is_locked("k").await);
        assert_eq!(metrics.snapshot(kind).force_releases, 1);
    }
}

#[tokio::test]
async fn test_invalid_arguments() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let provider = cluster.replica(kind, Arc::new(LockMetrics::new()));

        assert!(provider.try_lock("", Duration::ZERO, LEASE).await.is_err());
        assert!(provider.try_lock("k", Duration::ZERO, Duration::ZERO).await.is_err());
        assert!(provider.unlock("").await.is_err());
        assert!(!provider.is_locked("").await);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mutual_exclusion_under_contention() {
    for kind in ProviderKind::ALL {
        let cluster = Cluster::new();
        let metrics = Arc::new(LockMetrics::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let provider = cluster.replica(kind, metrics.clone());
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(with_lock_owner(format!("worker-{i}"), async move {
                for _ in 0..5 {
                    if provider.try_lock("k", Duration::from_secs(5), LEASE).await.unwrap() {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        provider.unlock("k").await.unwrap();
                    }
                }
            })));
        }
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1, "{kind}: overlapping holders");
        let snapshot = metrics.snapshot(kind);
        assert_eq!(snapshot.successes, snapshot.releases);
    }
}
