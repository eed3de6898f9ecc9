//! Account ledger contract and in-memory implementation
//!
//! Every balance write is conditioned on the version the writer read. A
//! writer whose lease silently expired cannot overwrite the rightful
//! holder's update; its write is rejected instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use crate::model::{Account, AccountStatus};

/// Balance, status and version read under the account's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub balance: Amount,
    pub status: AccountStatus,
    pub version: u64,
}

/// One version-checked balance write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedWrite {
    pub account_no: String,
    pub new_balance: Amount,
    pub expected_version: u64,
}

impl GuardedWrite {
    pub fn new(account_no: impl Into<String>, new_balance: Amount, expected_version: u64) -> Self {
        Self {
            account_no: account_no.into(),
            new_balance,
            expected_version,
        }
    }
}

#[async_trait]
pub trait AccountLedger: Send + Sync {
    async fn read_for_update(&self, account_no: &str) -> Result<AccountSnapshot>;

    /// Write `new_balance` only if the stored version is still `expected_version`
    ///
    /// Returns `Ok(false)` on version mismatch; never overwrites.
    async fn write_if_version(
        &self,
        account_no: &str,
        new_balance: Amount,
        expected_version: u64,
    ) -> Result<bool>;

    /// Apply several guarded writes atomically
    ///
    /// Either every version matches and all writes land, or nothing changes
    /// and `Ok(false)` is returned.
    async fn apply_guarded(&self, writes: &[GuardedWrite]) -> Result<bool>;

    async fn create_account(&self, account_no: &str, initial_balance: Amount) -> Result<Account>;

    async fn find(&self, account_no: &str) -> Result<Option<Account>>;

    async fn list(&self) -> Result<Vec<Account>>;

    /// Change an account's status according to the account transition table
    async fn update_status(&self, account_no: &str, status: AccountStatus) -> Result<Account>;

    /// Sum of all balances
    async fn total_balance(&self) -> Result<Amount>;
}

/// In-process ledger shared by simulated replicas
pub struct MemoryLedger {
    accounts: RwLock<HashMap<String, Account>>,
    available: AtomicBool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going offline or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("memory ledger offline".to_string()))
        }
    }

    fn validate_write(accounts: &HashMap<String, Account>, write: &GuardedWrite) -> Result<bool> {
        let account = accounts
            .get(&write.account_no)
            .ok_or_else(|| LedgerError::AccountNotFound(write.account_no.clone()))?;
        if write.new_balance.is_negative() {
            return Err(LedgerError::NegativeBalance(write.account_no.clone()));
        }
        Ok(account.version == write.expected_version)
    }

    fn commit(account: &mut Account, new_balance: Amount) {
        account.balance = new_balance;
        account.version += 1;
        account.updated_at = Utc::now();
    }
}

#[async_trait]
impl AccountLedger for MemoryLedger {
    async fn read_for_update(&self, account_no: &str) -> Result<AccountSnapshot> {
        self.check_available()?;
        let accounts = self.accounts.read();
        let account = accounts
            .get(account_no)
            .ok_or_else(|| LedgerError::AccountNotFound(account_no.to_string()))?;
        Ok(AccountSnapshot {
            balance: account.balance,
            status: account.status,
            version: account.version,
        })
    }

    async fn write_if_version(
        &self,
        account_no: &str,
        new_balance: Amount,
        expected_version: u64,
    ) -> Result<bool> {
        self.apply_guarded(&[GuardedWrite::new(account_no, new_balance, expected_version)])
            .await
    }

    async fn apply_guarded(&self, writes: &[GuardedWrite]) -> Result<bool> {
        self.check_available()?;
        let mut accounts = self.accounts.write();

        for write in writes {
            if !Self::validate_write(&accounts, write)? {
                debug!(
                    account = %write.account_no,
                    expected_version = write.expected_version,
                    "Guarded write rejected: version mismatch"
                );
                return Ok(false);
            }
        }

        for write in writes {
            if let Some(account) = accounts.get_mut(&write.account_no) {
                Self::commit(account, write.new_balance);
            }
        }
        Ok(true)
    }

    async fn create_account(&self, account_no: &str, initial_balance: Amount) -> Result<Account> {
        self.check_available()?;
        if !lockbank_common::is_valid_account_no(account_no) {
            return Err(LedgerError::InvalidAccountNo(account_no.to_string()));
        }
        if initial_balance.is_negative() {
            return Err(LedgerError::InvalidAmount(initial_balance.to_string()));
        }

        let mut accounts = self.accounts.write();
        if accounts.contains_key(account_no) {
            return Err(LedgerError::AccountExists(account_no.to_string()));
        }
        let account = Account::new(account_no, initial_balance);
        accounts.insert(account_no.to_string(), account.clone());
        info!(account = %account_no, balance = %initial_balance, "Account created");
        Ok(account)
    }

    async fn find(&self, account_no: &str) -> Result<Option<Account>> {
        self.check_available()?;
        Ok(self.accounts.read().get(account_no).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        self.check_available()?;
        let mut accounts: Vec<Account> = self.accounts.read().values().cloned().collect();
        accounts.sort_by(|a, b| a.account_no.cmp(&b.account_no));
        Ok(accounts)
    }

    async fn update_status(&self, account_no: &str, status: AccountStatus) -> Result<Account> {
        self.check_available()?;
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(account_no)
            .ok_or_else(|| LedgerError::AccountNotFound(account_no.to_string()))?;
        let previous = account.status;
        account.change_status(status)?;
        info!(account = %account_no, from = %previous, to = %status, "Account status changed");
        Ok(account.clone())
    }

    async fn total_balance(&self) -> Result<Amount> {
        self.check_available()?;
        self.accounts
            .read()
            .values()
            .try_fold(Amount::ZERO, |sum, account| sum.checked_add(account.balance))
            .ok_or_else(|| LedgerError::Overflow("*".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(text: &str) -> Amount {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn test_write_if_version_rejects_stale_version() {
        let ledger = MemoryLedger::new();
        ledger.create_account("ACC001", amount("100.00")).await.unwrap();

        let snapshot = ledger.read_for_update("ACC001").await.unwrap();
        assert!(
            ledger
                .write_if_version("ACC001", amount("90.00"), snapshot.version)
                .await
                .unwrap()
        );
        assert!(
            !ledger
                .write_if_version("ACC001", amount("80.00"), snapshot.version)
                .await
                .unwrap()
        );

        let account = ledger.find("ACC001").await.unwrap().unwrap();
        assert_eq!(account.balance, amount("90.00"));
        assert_eq!(account.version, snapshot.version + 1);
    }

    #[tokio::test]
    async fn test_apply_guarded_is_all_or_nothing() {
        let ledger = MemoryLedger::new();
        ledger.create_account("A", amount("10.00")).await.unwrap();
        ledger.create_account("B", amount("10.00")).await.unwrap();

        let a = ledger.read_for_update("A").await.unwrap();
        // B moves on before the pair is written
        ledger.write_if_version("B", amount("11.00"), 0).await.unwrap();

        let applied = ledger
            .apply_guarded(&[
                GuardedWrite::new("A", amount("5.00"), a.version),
                GuardedWrite::new("B", amount("15.00"), 0),
            ])
            .await
            .unwrap();

        assert!(!applied);
        assert_eq!(ledger.read_for_update("A").await.unwrap().balance, amount("10.00"));
        assert_eq!(ledger.read_for_update("B").await.unwrap().balance, amount("11.00"));
    }

    #[tokio::test]
    async fn test_negative_balance_is_rejected() {
        let ledger = MemoryLedger::new();
        ledger.create_account("A", amount("1.00")).await.unwrap();
        let err = ledger
            .write_if_version("A", amount("-0.01"), 0)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NegativeBalance("A".to_string()));
    }

    #[tokio::test]
    async fn test_create_account_validation() {
        let ledger = MemoryLedger::new();
        ledger.create_account("A", Amount::ZERO).await.unwrap();

        assert!(matches!(
            ledger.create_account("A", Amount::ZERO).await,
            Err(LedgerError::AccountExists(_))
        ));
        assert!(matches!(
            ledger.create_account("bad account", Amount::ZERO).await,
            Err(LedgerError::InvalidAccountNo(_))
        ));
        assert!(matches!(
            ledger.create_account("B", amount("-1.00")).await,
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status_uses_transition_table() {
        let ledger = MemoryLedger::new();
        ledger.create_account("A", Amount::ZERO).await.unwrap();

        let frozen = ledger.update_status("A", AccountStatus::Frozen).await.unwrap();
        assert_eq!(frozen.status, AccountStatus::Frozen);
        assert!(matches!(
            ledger.update_status("A", AccountStatus::Closed).await,
            Err(LedgerError::IllegalAccountTransition { .. })
        ));
        assert!(matches!(
            ledger.update_status("missing", AccountStatus::Active).await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_total_balance_and_outage() {
        let ledger = MemoryLedger::new();
        ledger.create_account("A", amount("1000.00")).await.unwrap();
        ledger.create_account("B", amount("500.00")).await.unwrap();
        assert_eq!(ledger.total_balance().await.unwrap(), amount("1500.00"));
        assert_eq!(ledger.list().await.unwrap().len(), 2);

        ledger.set_available(false);
        assert!(matches!(
            ledger.read_for_update("A").await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
