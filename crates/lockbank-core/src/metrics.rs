//! Transfer metrics

use std::time::Duration;

use lockbank_ledger::TransactionType;
use metrics::{counter, histogram};

use crate::error::TransferError;

pub const TRANSFER_TOTAL: &str = "transfer_total";
pub const TRANSFER_DURATION_SECONDS: &str = "transfer_duration_seconds";

/// Outcome label: "success" or the error kind
pub fn outcome_label<T>(result: &Result<T, TransferError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind().as_str(),
    }
}

pub fn record_outcome<T>(
    transaction_type: TransactionType,
    result: &Result<T, TransferError>,
    elapsed: Duration,
) {
    let outcome = outcome_label(result);
    counter!(TRANSFER_TOTAL, "type" => transaction_type.as_str(), "outcome" => outcome)
        .increment(1);
    histogram!(TRANSFER_DURATION_SECONDS, "type" => transaction_type.as_str(), "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}
