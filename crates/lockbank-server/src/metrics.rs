// Metric descriptions for the lock and transfer layers.
// Recording happens inside lockbank-lock and lockbank-core; no exporter is installed here.

use lockbank_core::metrics::{TRANSFER_DURATION_SECONDS, TRANSFER_TOTAL};
use lockbank_lock::metrics::{
    LOCK_ATTEMPTS_TOTAL, LOCK_FAILURE_TOTAL, LOCK_FORCE_RELEASE_TOTAL, LOCK_HOLD_DURATION_SECONDS,
    LOCK_RELEASE_TOTAL, LOCK_SUCCESS_TOTAL, LOCK_WAIT_DURATION_SECONDS,
};
use metrics::{Unit, describe_counter, describe_histogram};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Lock metrics, labelled by provider and key
    describe_counter!(LOCK_ATTEMPTS_TOTAL, "Total number of lock acquisition attempts");
    describe_counter!(LOCK_SUCCESS_TOTAL, "Total number of successful lock acquisitions");
    describe_counter!(
        LOCK_FAILURE_TOTAL,
        "Total number of failed lock operations by reason"
    );
    describe_counter!(LOCK_RELEASE_TOTAL, "Total number of lock releases");
    describe_counter!(
        LOCK_FORCE_RELEASE_TOTAL,
        "Total number of administrative force releases"
    );
    describe_histogram!(
        LOCK_WAIT_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent waiting to acquire a lock"
    );
    describe_histogram!(
        LOCK_HOLD_DURATION_SECONDS,
        Unit::Seconds,
        "Time a lock was held before release"
    );

    // Transfer metrics, labelled by type and outcome
    describe_counter!(TRANSFER_TOTAL, "Total number of transfer operations");
    describe_histogram!(
        TRANSFER_DURATION_SECONDS,
        Unit::Seconds,
        "Transfer operation duration in seconds"
    );
}
