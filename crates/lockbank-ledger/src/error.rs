//! Ledger error types

use uuid::Uuid;

use crate::model::{AccountStatus, TransactionEvent, TransactionStatus};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("invalid account number: {0}")]
    InvalidAccountNo(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("balance of account {0} would become negative")]
    NegativeBalance(String),

    #[error("balance of account {0} overflowed")]
    Overflow(String),

    #[error("illegal account status transition {from} -> {to}")]
    IllegalAccountTransition {
        from: AccountStatus,
        to: AccountStatus,
    },

    #[error("illegal transaction transition: {event} in state {from}")]
    IllegalTransactionTransition {
        from: TransactionStatus,
        event: TransactionEvent,
    },

    #[error("transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("transaction already exists: {0}")]
    TransactionExists(Uuid),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
