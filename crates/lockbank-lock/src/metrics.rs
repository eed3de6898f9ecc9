//! Lock metrics
//!
//! Passive recorder for lock attempt, success, failure, and release events.
//! Every event is kept in local per-provider counters (for status snapshots)
//! and forwarded to the `metrics` facade labelled with provider and key.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, histogram};

use crate::model::{FailureReason, ProviderKind, ProviderMetricsSnapshot};

pub const LOCK_ATTEMPTS_TOTAL: &str = "lock_attempts_total";
pub const LOCK_SUCCESS_TOTAL: &str = "lock_success_total";
pub const LOCK_FAILURE_TOTAL: &str = "lock_failure_total";
pub const LOCK_RELEASE_TOTAL: &str = "lock_release_total";
pub const LOCK_FORCE_RELEASE_TOTAL: &str = "lock_force_release_total";
pub const LOCK_WAIT_DURATION_SECONDS: &str = "lock_wait_duration_seconds";
pub const LOCK_HOLD_DURATION_SECONDS: &str = "lock_hold_duration_seconds";

#[derive(Default)]
struct ProviderCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    releases: AtomicU64,
    force_releases: AtomicU64,
    timeout: AtomicU64,
    interrupted: AtomicU64,
    exception: AtomicU64,
    not_held: AtomicU64,
    total_wait_micros: AtomicU64,
    total_hold_micros: AtomicU64,
}

impl ProviderCounters {
    fn failure_counter(&self, reason: FailureReason) -> &AtomicU64 {
        match reason {
            FailureReason::Timeout => &self.timeout,
            FailureReason::Interrupted => &self.interrupted,
            FailureReason::Exception => &self.exception,
            FailureReason::NotHeldByCurrentThread => &self.not_held,
        }
    }
}

/// Lock event recorder shared by the providers of one process
#[derive(Default)]
pub struct LockMetrics {
    providers: DashMap<ProviderKind, Arc<ProviderCounters>>,
}

impl LockMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, provider: ProviderKind) -> Arc<ProviderCounters> {
        self.providers.entry(provider).or_default().clone()
    }

    pub fn record_attempt(&self, provider: ProviderKind, key: &str) {
        self.counters(provider)
            .attempts
            .fetch_add(1, Ordering::Relaxed);
        counter!(LOCK_ATTEMPTS_TOTAL, "provider" => provider.as_str(), "key" => key.to_string())
            .increment(1);
    }

    pub fn record_success(&self, provider: ProviderKind, key: &str, wait: Duration) {
        let counters = self.counters(provider);
        counters.successes.fetch_add(1, Ordering::Relaxed);
        counters
            .total_wait_micros
            .fetch_add(wait.as_micros() as u64, Ordering::Relaxed);
        counter!(LOCK_SUCCESS_TOTAL, "provider" => provider.as_str(), "key" => key.to_string())
            .increment(1);
        histogram!(LOCK_WAIT_DURATION_SECONDS, "provider" => provider.as_str(), "key" => key.to_string())
            .record(wait.as_secs_f64());
    }

    pub fn record_failure(&self, provider: ProviderKind, key: &str, reason: FailureReason) {
        self.counters(provider)
            .failure_counter(reason)
            .fetch_add(1, Ordering::Relaxed);
        counter!(
            LOCK_FAILURE_TOTAL,
            "provider" => provider.as_str(),
            "key" => key.to_string(),
            "reason" => reason.as_str()
        )
        .increment(1);
    }

    pub fn record_release(&self, provider: ProviderKind, key: &str, held: Duration) {
        let counters = self.counters(provider);
        counters.releases.fetch_add(1, Ordering::Relaxed);
        counters
            .total_hold_micros
            .fetch_add(held.as_micros() as u64, Ordering::Relaxed);
        counter!(LOCK_RELEASE_TOTAL, "provider" => provider.as_str(), "key" => key.to_string())
            .increment(1);
        histogram!(LOCK_HOLD_DURATION_SECONDS, "provider" => provider.as_str(), "key" => key.to_string())
            .record(held.as_secs_f64());
    }

    pub fn record_force_release(&self, provider: ProviderKind, key: &str) {
        self.counters(provider)
            .force_releases
            .fetch_add(1, Ordering::Relaxed);
        counter!(LOCK_FORCE_RELEASE_TOTAL, "provider" => provider.as_str(), "key" => key.to_string())
            .increment(1);
    }

    /// Point-in-time snapshot for one provider
    ///
    /// `active_locks` is left at zero; the caller owning the handle table fills it in.
    pub fn snapshot(&self, provider: ProviderKind) -> ProviderMetricsSnapshot {
        let counters = self.counters(provider);
        let successes = counters.successes.load(Ordering::Relaxed);
        let releases = counters.releases.load(Ordering::Relaxed);

        let mut failures = BTreeMap::new();
        for reason in [
            FailureReason::Timeout,
            FailureReason::Interrupted,
            FailureReason::Exception,
            FailureReason::NotHeldByCurrentThread,
        ] {
            let count = counters.failure_counter(reason).load(Ordering::Relaxed);
            if count > 0 {
                failures.insert(reason.as_str().to_string(), count);
            }
        }

        ProviderMetricsSnapshot {
            provider: provider.as_str().to_string(),
            attempts: counters.attempts.load(Ordering::Relaxed),
            successes,
            failures,
            releases,
            force_releases: counters.force_releases.load(Ordering::Relaxed),
            avg_wait_ms: average_ms(counters.total_wait_micros.load(Ordering::Relaxed), successes),
            avg_hold_ms: average_ms(counters.total_hold_micros.load(Ordering::Relaxed), releases),
            active_locks: 0,
        }
    }
}

fn average_ms(total_micros: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_micros as f64 / count as f64 / 1000.0
    }
}
