//! LockBank Ledger - account balances and transaction records
//!
//! This crate provides:
//! - `Amount`, a fixed-point money type with two decimal places
//! - `Account` and `Transaction` with explicit status transition tables
//! - The `AccountLedger` guarded-write contract and an in-memory ledger
//! - The `TransactionStore` contract and an in-memory store

pub mod amount;
pub mod error;
pub mod ledger;
pub mod model;
pub mod transaction;

pub use amount::Amount;
pub use error::{LedgerError, Result};
pub use ledger::{AccountLedger, AccountSnapshot, GuardedWrite, MemoryLedger};
pub use model::{
    Account, AccountStatus, Transaction, TransactionEvent, TransactionStatus, TransactionType,
};
pub use transaction::{MemoryTransactionStore, TransactionStore};
