//! Utility functions for LockBank
//!
//! Common helper functions used across the codebase.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::KEY_SEPARATOR;

/// Account numbers: 1-64 alphanumeric, underscore or hyphen characters
static ACCOUNT_NO_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-zA-Z0-9_-]{1,64}$").expect("Invalid regex pattern"));

/// Validate the shape of an account number
///
/// # Examples
///
/// ```
/// use lockbank_common::is_valid_account_no;
///
/// assert!(is_valid_account_no("ACC001"));
/// assert!(!is_valid_account_no(""));
/// assert!(!is_valid_account_no("ACC 001"));
/// ```
pub fn is_valid_account_no(account_no: &str) -> bool {
    ACCOUNT_NO_PATTERN.is_match(account_no)
}

/// Build the lock key guarding a resource inside a namespace
///
/// # Examples
///
/// ```
/// use lockbank_common::resource_key;
///
/// assert_eq!(resource_key("account", "ACC001"), "account:ACC001");
/// ```
pub fn resource_key(namespace: &str, name: &str) -> String {
    format!("{}{}{}", namespace, KEY_SEPARATOR, name)
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
