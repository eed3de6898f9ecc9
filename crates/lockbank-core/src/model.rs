//! Transfer requests, receipts and service configuration

use std::time::Duration;

use lockbank_ledger::{Amount, TransactionStatus, TransactionType};
use lockbank_lock::ProviderKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lock timing and key layout used by the transfer service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Bounded wait for each account lock
    pub lock_wait: Duration,
    /// Lease on each account lock
    pub lock_lease: Duration,
    /// Namespace prefixed to account numbers to form lock keys
    pub key_namespace: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_millis(3000),
            lock_lease: Duration::from_millis(10_000),
            key_namespace: lockbank_common::DEFAULT_KEY_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: Amount) -> Self {
        Self {
            from_account: from.into(),
            to_account: to.into(),
            amount,
            description: None,
        }
    }
}

/// Single-account request; used for both withdrawals and deposits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub account: String,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

impl AccountRequest {
    pub fn new(account: impl Into<String>, amount: Amount) -> Self {
        Self {
            account: account.into(),
            amount,
            description: None,
        }
    }
}

/// Result of a completed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transaction_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: Amount,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    /// Source balance after the operation
    pub from_balance: Option<Amount>,
    /// Target balance after the operation
    pub to_balance: Option<Amount>,
    pub lock_provider: ProviderKind,
}
