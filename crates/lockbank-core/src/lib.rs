//! LockBank Core - guarded funds transfer
//!
//! `TransferService` combines the lock manager and the account ledger into
//! deadlock-free, balance-conserving transfer, withdrawal and deposit
//! operations that stay correct across replicas.

pub mod error;
pub mod metrics;
pub mod model;
pub mod service;

pub use error::{ErrorKind, Result, TransferError};
pub use model::{AccountRequest, TransferConfig, TransferReceipt, TransferRequest};
pub use service::TransferService;
