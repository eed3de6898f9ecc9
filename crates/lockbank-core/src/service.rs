//! Transfer service
//!
//! Runs transfers, withdrawals and deposits as guarded critical sections:
//! validate, lock the account keys in canonical order, re-read and verify
//! under the locks, apply version-checked writes, release in reverse order,
//! then settle the transaction record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lockbank_common::{is_valid_account_no, resource_key};
use lockbank_ledger::{
    AccountLedger, AccountStatus, Amount, GuardedWrite, LedgerError, Transaction,
    TransactionEvent, TransactionStatus, TransactionStore, TransactionType,
};
use lockbank_lock::{LockManager, ProviderSelection, with_lock_owner};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, TransferError};
use crate::metrics::record_outcome;
use crate::model::{AccountRequest, TransferConfig, TransferReceipt, TransferRequest};

/// Locks held by one operation, released in reverse acquisition order
///
/// Every key goes through the same pinned provider. If the operation is dropped while holding locks, the release is handed
/// to a spawned task that re-enters the operation's owner scope.
struct HeldLocks {
    selection: Arc<ProviderSelection>,
    owner: String,
    keys: Vec<String>,
}

impl HeldLocks {
    fn new(selection: Arc<ProviderSelection>, owner: String) -> Self {
        Self {
            selection,
            owner,
            keys: Vec::with_capacity(2),
        }
    }

    async fn acquire(&mut self, key: &str, wait: Duration, lease: Duration) -> Result<()> {
        if self.selection.provider.try_lock(key, wait, lease).await? {
            self.keys.push(key.to_string());
            Ok(())
        } else {
            Err(TransferError::LockUnavailable {
                key: key.to_string(),
            })
        }
    }

    async fn release_all(&mut self) {
        while let Some(key) = self.keys.pop() {
            match self.selection.provider.unlock(&key).await {
                Ok(true) => {}
                Ok(false) => warn!(key = %key, "Lock was no longer held at release"),
                Err(e) => warn!(key = %key, error = %e, "Lock release failed"),
            }
        }
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let keys = std::mem::take(&mut self.keys);
        warn!(keys = ?keys, owner = %self.owner, "Operation dropped while holding locks");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let selection = self.selection.clone();
            runtime.spawn(with_lock_owner(self.owner.clone(), async move {
                for key in keys.iter().rev() {
                    let _ = selection.provider.unlock(key).await;
                }
            }));
        }
    }
}

/// Settles a transaction record left open by a dropped operation
struct OpenTransaction {
    store: Arc<dyn TransactionStore>,
    id: Option<Uuid>,
}

impl OpenTransaction {
    fn settled(&mut self) {
        self.id = None;
    }
}

impl Drop for OpenTransaction {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let store = self.store.clone();
            runtime.spawn(async move {
                if store
                    .transition(id, TransactionEvent::Cancel, None)
                    .await
                    .is_err()
                {
                    let _ = store
                        .transition(
                            id,
                            TransactionEvent::Fail,
                            Some("operation cancelled".to_string()),
                        )
                        .await;
                }
            });
        }
    }
}

/// Balances written by a successful critical section
struct Settlement {
    from_balance: Option<Amount>,
    to_balance: Option<Amount>,
}

pub struct TransferService {
    ledger: Arc<dyn AccountLedger>,
    transactions: Arc<dyn TransactionStore>,
    locks: Arc<LockManager>,
    config: TransferConfig,
}

impl TransferService {
    pub fn new(
        ledger: Arc<dyn AccountLedger>,
        transactions: Arc<dyn TransactionStore>,
        locks: Arc<LockManager>,
        config: TransferConfig,
    ) -> Self {
        Self {
            ledger,
            transactions,
            locks,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn AccountLedger> {
        &self.ledger
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Lock key guarding `account_no`
    pub fn lock_key(&self, account_no: &str) -> String {
        resource_key(&self.config.key_namespace, account_no)
    }

    pub async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.transactions.find(id).await?)
    }

    pub async fn transactions_for(&self, account_no: &str) -> Result<Vec<Transaction>> {
        Ok(self.transactions.list_by_account(account_no).await?)
    }

    /// Move `amount` from one account to another
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let started = Instant::now();
        let owner = Uuid::new_v4().to_string();
        let result = with_lock_owner(owner.clone(), self.run_transfer(owner, request)).await;
        record_outcome(TransactionType::Transfer, &result, started.elapsed());
        result
    }

    /// Debit a single account
    pub async fn withdraw(&self, request: AccountRequest) -> Result<TransferReceipt> {
        let started = Instant::now();
        let owner = Uuid::new_v4().to_string();
        let result = with_lock_owner(
            owner.clone(),
            self.run_single(owner, TransactionType::Withdrawal, request),
        )
        .await;
        record_outcome(TransactionType::Withdrawal, &result, started.elapsed());
        result
    }

    /// Credit a single account
    pub async fn deposit(&self, request: AccountRequest) -> Result<TransferReceipt> {
        let started = Instant::now();
        let owner = Uuid::new_v4().to_string();
        let result = with_lock_owner(
            owner.clone(),
            self.run_single(owner, TransactionType::Deposit, request),
        )
        .await;
        record_outcome(TransactionType::Deposit, &result, started.elapsed());
        result
    }

    async fn run_transfer(&self, owner: String, request: TransferRequest) -> Result<TransferReceipt> {
        let TransferRequest {
            from_account: from,
            to_account: to,
            amount,
            description,
        } = request;

        if from == to {
            return Err(TransferError::SameAccount(from));
        }
        validate_amount(amount)?;
        self.ensure_eligible(&from).await?;
        self.ensure_eligible(&to).await?;

        let pinned = self.locks.pin();
        let provider = pinned.kind;
        let transaction =
            Transaction::transfer(from.as_str(), to.as_str(), amount, provider.as_str())
                .with_description(description);

        let mut keys = [self.lock_key(&from), self.lock_key(&to)];
        keys.sort();

        let outcome = self
            .guarded(owner, pinned, transaction, &keys, || {
                self.settle_transfer(&from, &to, amount)
            })
            .await;

        outcome.map(|(id, settlement)| TransferReceipt {
            transaction_id: id,
            transaction_type: TransactionType::Transfer,
            status: TransactionStatus::Completed,
            amount,
            from_account: Some(from.clone()),
            to_account: Some(to.clone()),
            from_balance: settlement.from_balance,
            to_balance: settlement.to_balance,
            lock_provider: provider,
        })
    }

    async fn run_single(
        &self,
        owner: String,
        transaction_type: TransactionType,
        request: AccountRequest,
    ) -> Result<TransferReceipt> {
        let AccountRequest {
            account,
            amount,
            description,
        } = request;

        validate_amount(amount)?;
        self.ensure_eligible(&account).await?;

        let pinned = self.locks.pin();
        let provider = pinned.kind;
        let (transaction, from_account, to_account) = match transaction_type {
            TransactionType::Deposit => (
                Transaction::deposit(account.as_str(), amount, provider.as_str()),
                None,
                Some(account.clone()),
            ),
            _ => (
                Transaction::withdrawal(account.as_str(), amount, provider.as_str()),
                Some(account.clone()),
                None,
            ),
        };
        let transaction = transaction.with_description(description);
        let keys = [self.lock_key(&account)];

        let outcome = self
            .guarded(owner, pinned, transaction, &keys, || {
                self.settle_single(transaction_type, &account, amount)
            })
            .await;

        outcome.map(|(id, settlement)| TransferReceipt {
            transaction_id: id,
            transaction_type,
            status: TransactionStatus::Completed,
            amount,
            from_account,
            to_account,
            from_balance: settlement.from_balance,
            to_balance: settlement.to_balance,
            lock_provider: provider,
        })
    }

    /// Record `transaction`, run `critical` under the locks for `keys`, settle
    ///
    /// `keys` must already be in canonical order and are all locked through
    /// `pinned`. Locks are released on every exit path before the
    /// transaction reaches its terminal state.
    async fn guarded<F, Fut>(
        &self,
        owner: String,
        pinned: Arc<ProviderSelection>,
        transaction: Transaction,
        keys: &[String],
        critical: F,
    ) -> Result<(Uuid, Settlement)>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Settlement>>,
    {
        let id = transaction.id;
        let transaction_type = transaction.transaction_type;
        self.transactions.insert(transaction).await?;
        let mut open = OpenTransaction {
            store: self.transactions.clone(),
            id: Some(id),
        };

        let mut held = HeldLocks::new(pinned, owner);
        for key in keys {
            if let Err(e) = held
                .acquire(key, self.config.lock_wait, self.config.lock_lease)
                .await
            {
                held.release_all().await;
                debug!(transaction = %id, key = %key, error = %e, "Lock acquisition failed");
                self.transactions
                    .transition(id, TransactionEvent::Fail, Some(e.to_string()))
                    .await?;
                open.settled();
                return Err(e);
            }
        }

        let outcome = match self.transactions.transition(id, TransactionEvent::Start, None).await {
            Ok(_) => critical().await,
            Err(e) => Err(e.into()),
        };

        held.release_all().await;

        let settled = match &outcome {
            Ok(_) => {
                self.transactions
                    .transition(id, TransactionEvent::Complete, None)
                    .await
            }
            Err(e) => {
                self.transactions
                    .transition(id, TransactionEvent::Fail, Some(e.to_string()))
                    .await
            }
        };
        open.settled();

        match (&outcome, settled) {
            (Ok(_), Ok(_)) => {
                info!(transaction = %id, tx_type = %transaction_type, "Transaction completed")
            }
            (Err(e), Ok(_)) => info!(
                transaction = %id,
                tx_type = %transaction_type,
                outcome = e.kind().as_str(),
                error = %e,
                "Transaction failed"
            ),
            (_, Err(e)) => {
                warn!(transaction = %id, error = %e, "Failed to settle transaction record")
            }
        }

        outcome.map(|settlement| (id, settlement))
    }

    async fn ensure_eligible(&self, account_no: &str) -> Result<()> {
        if !is_valid_account_no(account_no) {
            return Err(TransferError::InvalidAccountNo(account_no.to_string()));
        }
        let account = self
            .ledger
            .find(account_no)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(account_no.to_string()))?;
        check_status(account_no, account.status)
    }

    async fn settle_transfer(&self, from: &str, to: &str, amount: Amount) -> Result<Settlement> {
        // Balances read before the locks were taken are stale by definition
        let source = self.ledger.read_for_update(from).await?;
        let target = self.ledger.read_for_update(to).await?;
        check_status(from, source.status)?;
        check_status(to, target.status)?;

        if source.balance < amount {
            return Err(TransferError::InsufficientFunds {
                account: from.to_string(),
                balance: source.balance,
                requested: amount,
            });
        }
        let from_balance = source
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::Overflow(from.to_string()))?;
        let to_balance = target
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(to.to_string()))?;

        let applied = self
            .ledger
            .apply_guarded(&[
                GuardedWrite::new(from, from_balance, source.version),
                GuardedWrite::new(to, to_balance, target.version),
            ])
            .await?;
        if !applied {
            return Err(TransferError::Conflict(format!("{from},{to}")));
        }

        Ok(Settlement {
            from_balance: Some(from_balance),
            to_balance: Some(to_balance),
        })
    }

    async fn settle_single(
        &self,
        transaction_type: TransactionType,
        account_no: &str,
        amount: Amount,
    ) -> Result<Settlement> {
        let current = self.ledger.read_for_update(account_no).await?;
        check_status(account_no, current.status)?;

        let new_balance = if transaction_type == TransactionType::Deposit {
            current.balance.checked_add(amount)
        } else {
            if current.balance < amount {
                return Err(TransferError::InsufficientFunds {
                    account: account_no.to_string(),
                    balance: current.balance,
                    requested: amount,
                });
            }
            current.balance.checked_sub(amount)
        }
        .ok_or_else(|| LedgerError::Overflow(account_no.to_string()))?;

        if !self
            .ledger
            .write_if_version(account_no, new_balance, current.version)
            .await?
        {
            return Err(TransferError::Conflict(account_no.to_string()));
        }

        Ok(if transaction_type == TransactionType::Deposit {
            Settlement {
                from_balance: None,
                to_balance: Some(new_balance),
            }
        } else {
            Settlement {
                from_balance: Some(new_balance),
                to_balance: None,
            }
        })
    }
}

fn validate_amount(amount: Amount) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(TransferError::InvalidAmount(amount))
    }
}

fn check_status(account_no: &str, status: AccountStatus) -> Result<()> {
    if status.is_transaction_eligible() {
        Ok(())
    } else {
        Err(TransferError::AccountNotEligible {
            account: account_no.to_string(),
            status,
        })
    }
}
