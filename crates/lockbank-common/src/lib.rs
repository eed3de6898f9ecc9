//! LockBank Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all LockBank components:
//! - Error codes and the binary-boundary error wrapper
//! - Lock key and account number helpers
//! - Time utilities

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{AppError, ErrorCode};
pub use utils::{current_timestamp, is_valid_account_no, resource_key};

/// Default namespace prefixed to account numbers when building lock keys
pub const DEFAULT_KEY_NAMESPACE: &str = "account";

/// Separator between namespace and resource name inside a lock key
pub const KEY_SEPARATOR: char = ':';
