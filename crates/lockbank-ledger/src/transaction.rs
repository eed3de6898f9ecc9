//! Transaction records

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::model::{Transaction, TransactionEvent};

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, transaction: Transaction) -> Result<()>;

    /// Apply `event` through the transaction transition table
    ///
    /// `failure_reason` is recorded when the event moves the transaction
    /// to a failed state.
    async fn transition(
        &self,
        id: Uuid,
        event: TransactionEvent,
        failure_reason: Option<String>,
    ) -> Result<Transaction>;

    async fn find(&self, id: Uuid) -> Result<Option<Transaction>>;

    /// Transactions touching `account_no`, oldest first
    async fn list_by_account(&self, account_no: &str) -> Result<Vec<Transaction>>;
}

#[derive(Default)]
pub struct MemoryTransactionStore {
    transactions: DashMap<Uuid, Transaction>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert(&self, transaction: Transaction) -> Result<()> {
        match self.transactions.entry(transaction.id) {
            Entry::Occupied(_) => Err(LedgerError::TransactionExists(transaction.id)),
            Entry::Vacant(entry) => {
                entry.insert(transaction);
                Ok(())
            }
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        event: TransactionEvent,
        failure_reason: Option<String>,
    ) -> Result<Transaction> {
        let mut transaction = self
            .transactions
            .get_mut(&id)
            .ok_or(LedgerError::TransactionNotFound(id))?;
        let next = transaction.apply(event)?;
        if event == TransactionEvent::Fail {
            transaction.failure_reason = failure_reason;
        }
        debug!(transaction = %id, status = %next, "Transaction status changed");
        Ok(transaction.clone())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn list_by_account(&self, account_no: &str) -> Result<Vec<Transaction>> {
        let mut matching: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.involves(account_no))
            .map(|t| t.clone())
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }
}
