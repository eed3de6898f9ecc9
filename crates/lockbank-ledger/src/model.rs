//! Account and transaction model
//!
//! Status changes go through explicit transition tables; nothing else in the
//! crate decides whether a transition is legal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::error::LedgerError;

// ============================================================================
// Account
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Frozen,
    Closed,
}

/// Legal (from, to) account status changes; Closed is terminal
const ACCOUNT_TRANSITIONS: &[(AccountStatus, AccountStatus)] = &[
    (AccountStatus::Active, AccountStatus::Inactive),
    (AccountStatus::Active, AccountStatus::Frozen),
    (AccountStatus::Active, AccountStatus::Closed),
    (AccountStatus::Inactive, AccountStatus::Active),
    (AccountStatus::Inactive, AccountStatus::Closed),
    (AccountStatus::Frozen, AccountStatus::Active),
];

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Frozen => "FROZEN",
            AccountStatus::Closed => "CLOSED",
        }
    }

    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        ACCOUNT_TRANSITIONS.contains(&(self, next))
    }

    /// Whether the account may take part in a transfer, withdrawal or deposit
    pub fn is_transaction_eligible(self) -> bool {
        self == AccountStatus::Active
    }

    pub fn is_terminal(self) -> bool {
        !ACCOUNT_TRANSITIONS.iter().any(|(from, _)| *from == self)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_no: String,
    pub balance: Amount,
    pub status: AccountStatus,
    /// Incremented on every write; guards optimistic updates
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(account_no: impl Into<String>, balance: Amount) -> Self {
        let now = Utc::now();
        Self {
            account_no: account_no.into(),
            balance,
            status: AccountStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn change_status(&mut self, next: AccountStatus) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::IllegalAccountTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Transaction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Transfer,
    Withdrawal,
    Deposit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Deposit => "deposit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionEvent {
    Start,
    Complete,
    Fail,
    Cancel,
}

impl fmt::Display for TransactionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionEvent::Start => "start",
            TransactionEvent::Complete => "complete",
            TransactionEvent::Fail => "fail",
            TransactionEvent::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// (state, event) -> next state
///
/// Pending may settle directly as Failed or Cancelled: a transaction whose
/// locks could not be taken, or whose operation was dropped before any work
/// ran, never passes through Processing.
const TRANSACTION_TRANSITIONS: &[(TransactionStatus, TransactionEvent, TransactionStatus)] = &[
    (TransactionStatus::Pending, TransactionEvent::Start, TransactionStatus::Processing),
    (TransactionStatus::Pending, TransactionEvent::Fail, TransactionStatus::Failed),
    (TransactionStatus::Pending, TransactionEvent::Cancel, TransactionStatus::Cancelled),
    (TransactionStatus::Processing, TransactionEvent::Complete, TransactionStatus::Completed),
    (TransactionStatus::Processing, TransactionEvent::Fail, TransactionStatus::Failed),
];

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn next(self, event: TransactionEvent) -> Option<TransactionStatus> {
        TRANSACTION_TRANSITIONS
            .iter()
            .find(|(from, on, _)| *from == self && *on == event)
            .map(|(_, _, to)| *to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    /// Absent for deposits
    pub from_account: Option<String>,
    /// Absent for withdrawals
    pub to_account: Option<String>,
    pub amount: Amount,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    /// Lock provider active when the transaction took its locks
    pub lock_provider: String,
    pub description: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    fn new(
        transaction_type: TransactionType,
        from_account: Option<String>,
        to_account: Option<String>,
        amount: Amount,
        lock_provider: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from_account,
            to_account,
            amount,
            transaction_type,
            status: TransactionStatus::Pending,
            lock_provider: lock_provider.into(),
            description: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transfer(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: Amount,
        lock_provider: impl Into<String>,
    ) -> Self {
        Self::new(
            TransactionType::Transfer,
            Some(from.into()),
            Some(to.into()),
            amount,
            lock_provider,
        )
    }

    pub fn withdrawal(from: impl Into<String>, amount: Amount, lock_provider: impl Into<String>) -> Self {
        Self::new(TransactionType::Withdrawal, Some(from.into()), None, amount, lock_provider)
    }

    pub fn deposit(to: impl Into<String>, amount: Amount, lock_provider: impl Into<String>) -> Self {
        Self::new(TransactionType::Deposit, None, Some(to.into()), amount, lock_provider)
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Whether `account_no` is either side of this transaction
    pub fn involves(&self, account_no: &str) -> bool {
        self.from_account.as_deref() == Some(account_no)
            || self.to_account.as_deref() == Some(account_no)
    }

    pub fn apply(&mut self, event: TransactionEvent) -> Result<TransactionStatus, LedgerError> {
        let next = self
            .status
            .next(event)
            .ok_or(LedgerError::IllegalTransactionTransition {
                from: self.status,
                event,
            })?;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}
