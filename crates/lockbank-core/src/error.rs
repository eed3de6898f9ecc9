//! Transfer outcome taxonomy

use lockbank_common::ErrorCode;
use lockbank_common::error::{
    ACCOUNT_NOT_ELIGIBLE, ACCOUNT_NOT_FOUND, DATA_ACCESS_ERROR, INSUFFICIENT_FUNDS,
    INVALID_AMOUNT, INVALID_LOCK_KEY, LOCK_UNAVAILABLE, PARAMETER_VALIDATE_ERROR,
    RESOURCE_CONFLICT, SAME_ACCOUNT_TRANSFER, SERVER_ERROR, UNSUPPORTED_PROVIDER,
};
use lockbank_ledger::{AccountStatus, Amount, LedgerError};
use lockbank_lock::LockError;
use serde::Serialize;

/// Class of a failed transfer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any lock or ledger interaction
    Validation,
    /// A lock could not be acquired within the wait time
    LockUnavailable,
    InsufficientFunds,
    /// A guarded write found the account version moved on
    Conflict,
    /// Lock service or ledger fault
    Backend,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::LockUnavailable => "lock_unavailable",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Backend => "backend",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Amount),

    #[error("source and target account are both {0}")]
    SameAccount(String),

    #[error("invalid account number: {0}")]
    InvalidAccountNo(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account {account} is {status} and cannot take part in transactions")]
    AccountNotEligible {
        account: String,
        status: AccountStatus,
    },

    #[error("lock unavailable: {key}")]
    LockUnavailable { key: String },

    #[error("insufficient funds in {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: String,
        balance: Amount,
        requested: Amount,
    },

    #[error("concurrent modification of {0}; re-validate and retry")]
    Conflict(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InvalidAmount(_)
            | TransferError::SameAccount(_)
            | TransferError::InvalidAccountNo(_)
            | TransferError::AccountNotFound(_)
            | TransferError::AccountNotEligible { .. } => ErrorKind::Validation,
            TransferError::LockUnavailable { .. } => ErrorKind::LockUnavailable,
            TransferError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            TransferError::Conflict(_) => ErrorKind::Conflict,
            TransferError::Lock(LockError::InvalidKey | LockError::InvalidLease) => {
                ErrorKind::Validation
            }
            TransferError::Lock(_) | TransferError::Ledger(_) => ErrorKind::Backend,
        }
    }

    /// Only version conflicts are safe to retry, and only after fresh validation
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            TransferError::InvalidAmount(_) => INVALID_AMOUNT,
            TransferError::SameAccount(_) => SAME_ACCOUNT_TRANSFER,
            TransferError::InvalidAccountNo(_) => PARAMETER_VALIDATE_ERROR,
            TransferError::AccountNotFound(_) => ACCOUNT_NOT_FOUND,
            TransferError::AccountNotEligible { .. } => ACCOUNT_NOT_ELIGIBLE,
            TransferError::LockUnavailable { .. } => LOCK_UNAVAILABLE,
            TransferError::InsufficientFunds { .. } => INSUFFICIENT_FUNDS,
            TransferError::Conflict(_) => RESOURCE_CONFLICT,
            TransferError::Lock(LockError::InvalidKey) => INVALID_LOCK_KEY,
            TransferError::Lock(LockError::UnsupportedProvider(_)) => UNSUPPORTED_PROVIDER,
            TransferError::Lock(_) => SERVER_ERROR,
            TransferError::Ledger(_) => DATA_ACCESS_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        let conflict = TransferError::Conflict("ACC001".to_string());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(conflict.is_retryable());

        let insufficient = TransferError::InsufficientFunds {
            account: "ACC002".to_string(),
            balance: Amount::from_minor(50_000),
            requested: Amount::from_minor(99_999_900),
        };
        assert!(!insufficient.is_retryable());
        assert_eq!(insufficient.error_code().code, 25001);
        assert_eq!(
            insufficient.to_string(),
            "insufficient funds in ACC002: balance 500.00, requested 999999.00"
        );
    }

    #[test]
    fn test_backend_faults_classified() {
        let ledger = TransferError::from(LedgerError::Unavailable("down".to_string()));
        assert_eq!(ledger.kind(), ErrorKind::Backend);
        assert_eq!(ledger.error_code(), DATA_ACCESS_ERROR);

        let key = TransferError::from(LockError::InvalidKey);
        assert_eq!(key.kind(), ErrorKind::Validation);
        assert_eq!(key.error_code(), INVALID_LOCK_KEY);
    }

    #[test]
    fn test_lock_unavailable() {
        let err = TransferError::LockUnavailable {
            key: "account:ACC001".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::LockUnavailable);
        assert_eq!(err.kind().as_str(), "lock_unavailable");
        assert_eq!(err.error_code(), LOCK_UNAVAILABLE);
    }
}
