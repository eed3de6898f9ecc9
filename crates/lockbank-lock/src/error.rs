//! Lock error types

/// Errors raised by lock providers and the lock manager
///
/// Contention outcomes (timeout, not held) are not errors; they surface as
/// `Ok(false)`. Backend faults are converted to failure outcomes at the
/// provider boundary and only reach callers of the raw backends.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("lock key must not be empty")]
    InvalidKey,

    #[error("lease time must be greater than zero")]
    InvalidLease,

    #[error("unsupported lock provider: {0}")]
    UnsupportedProvider(String),

    #[error("lock backend unavailable: {0}")]
    Unavailable(String),

    #[error("lock backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for LockError {
    fn from(value: redis::RedisError) -> Self {
        LockError::Backend(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_error_display() {
        assert_eq!(LockError::InvalidKey.to_string(), "lock key must not be empty");
        assert_eq!(
            LockError::UnsupportedProvider("etcd".to_string()).to_string(),
            "unsupported lock provider: etcd"
        );
        assert_eq!(
            LockError::Backend("boom".to_string()).to_string(),
            "lock backend error: boom"
        );
    }
}
