//! Error codes and the application error wrapper
//!
//! This module defines:
//! - `AppError`: Wrapper around `anyhow::Error` used at the binary boundary
//! - `ErrorCode`: Structured codes for every outcome the transfer protocol reports

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Wrapper for application errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

/// Error code structure for reported outcomes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

// Input validation (rejected before any lock or ledger interaction)
pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const INVALID_LOCK_KEY: ErrorCode<'static> = ErrorCode {
    code: 20101,
    message: "lock key must not be empty",
};

pub const INVALID_AMOUNT: ErrorCode<'static> = ErrorCode {
    code: 20102,
    message: "amount must be positive",
};

pub const SAME_ACCOUNT_TRANSFER: ErrorCode<'static> = ErrorCode {
    code: 20103,
    message: "source and target account must differ",
};

pub const ACCOUNT_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 20104,
    message: "account not found",
};

pub const ACCOUNT_NOT_ELIGIBLE: ErrorCode<'static> = ErrorCode {
    code: 20105,
    message: "account status does not allow transactions",
};

pub const ILLEGAL_STATE: ErrorCode<'static> = ErrorCode {
    code: 23000,
    message: "illegal state",
};

// Lock contention
pub const LOCK_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 24001,
    message: "lock unavailable",
};

pub const UNSUPPORTED_PROVIDER: ErrorCode<'static> = ErrorCode {
    code: 24002,
    message: "unsupported lock provider",
};

// Business outcomes
pub const INSUFFICIENT_FUNDS: ErrorCode<'static> = ErrorCode {
    code: 25001,
    message: "insufficient funds",
};

// Persistence conflicts
pub const RESOURCE_CONFLICT: ErrorCode<'static> = ErrorCode {
    code: 20005,
    message: "resource conflict",
};

// Backend faults
pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_constants() {
        assert_eq!(SUCCESS.code, 0);
        assert_eq!(SUCCESS.message, "success");
        assert_eq!(LOCK_UNAVAILABLE.code, 24001);
        assert_eq!(INSUFFICIENT_FUNDS.code, 25001);
        assert_ne!(RESOURCE_CONFLICT.code, LOCK_UNAVAILABLE.code);
    }

    #[test]
    fn test_app_error_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("test error");
        let app_err = AppError::from(anyhow_err);
        assert_eq!(format!("{}", app_err), "test error");
    }

    #[test]
    fn test_app_error_downcast() {
        #[derive(thiserror::Error, Debug)]
        #[error("boom")]
        struct Boom;

        let app_err = AppError::from(anyhow::Error::new(Boom));
        assert!(app_err.downcast_ref::<Boom>().is_some());
    }
}
