//! Administrative operations behind the CLI subcommands
//!
//! Every operation returns a JSON document describing the outcome.

use lockbank_core::{AccountRequest, TransferError, TransferReceipt, TransferRequest};
use lockbank_ledger::{AccountLedger, Amount};
use lockbank_lock::{LockStatistics, ProviderKind, ProviderStatus};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::model::Command;
use crate::startup::Stack;

pub const DEMO_SOURCE: &str = "ACC001";
pub const DEMO_TARGET: &str = "ACC002";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: ProviderStatus,
    pub statistics: LockStatistics,
}

/// Failed operation as reported to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub kind: &'static str,
    pub code: i32,
    pub message: String,
    pub retryable: bool,
}

impl From<&TransferError> for FailureReport {
    fn from(error: &TransferError) -> Self {
        Self {
            kind: error.kind().as_str(),
            code: error.error_code().code,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum StepOutcome {
    Success(TransferReceipt),
    Failure(FailureReport),
}

impl From<lockbank_core::Result<TransferReceipt>> for StepOutcome {
    fn from(result: lockbank_core::Result<TransferReceipt>) -> Self {
        match result {
            Ok(receipt) => StepOutcome::Success(receipt),
            Err(e) => StepOutcome::Failure(FailureReport::from(&e)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    pub source: Amount,
    pub target: Amount,
    pub total: Amount,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoReport {
    pub provider: ProviderKind,
    pub opening: Balances,
    pub transfer: StepOutcome,
    pub after_transfer: Balances,
    pub withdrawal: StepOutcome,
    pub closing: Balances,
}

pub async fn status(stack: &Stack) -> StatusReport {
    StatusReport {
        status: stack.locks.provider_status().await,
        statistics: stack.locks.lock_statistics(),
    }
}

async fn balances(stack: &Stack) -> anyhow::Result<Balances> {
    let balance = |account: Option<lockbank_ledger::Account>, account_no: &str| {
        account
            .map(|a| a.balance)
            .ok_or_else(|| anyhow::anyhow!("account {} missing", account_no))
    };
    Ok(Balances {
        source: balance(stack.ledger.find(DEMO_SOURCE).await?, DEMO_SOURCE)?,
        target: balance(stack.ledger.find(DEMO_TARGET).await?, DEMO_TARGET)?,
        total: stack.ledger.total_balance().await?,
    })
}

/// Open ACC001 with 1000.00 and ACC002 with 500.00, move 100.00 between them,
/// then attempt a withdrawal far beyond ACC002's balance.
pub async fn demo(stack: &Stack) -> anyhow::Result<DemoReport> {
    stack
        .ledger
        .create_account(DEMO_SOURCE, Amount::from_minor(100_000))
        .await?;
    stack
        .ledger
        .create_account(DEMO_TARGET, Amount::from_minor(50_000))
        .await?;
    let opening = balances(stack).await?;

    let transfer = stack
        .transfers
        .transfer(TransferRequest::new(
            DEMO_SOURCE,
            DEMO_TARGET,
            Amount::from_minor(10_000),
        ))
        .await;
    let after_transfer = balances(stack).await?;

    let withdrawal = stack
        .transfers
        .withdraw(AccountRequest::new(
            DEMO_TARGET,
            Amount::from_minor(99_999_900),
        ))
        .await;
    let closing = balances(stack).await?;

    info!(
        source = %closing.source,
        target = %closing.target,
        "Demo scenario finished"
    );

    Ok(DemoReport {
        provider: stack.locks.current_provider(),
        opening,
        transfer: transfer.into(),
        after_transfer,
        withdrawal: withdrawal.into(),
        closing,
    })
}

/// Execute one subcommand against an assembled stack
pub async fn execute(command: &Command, stack: &Stack) -> anyhow::Result<Value> {
    let value = match command {
        Command::Status => serde_json::to_value(status(stack).await)?,
        Command::Switch { provider } => {
            let kind: ProviderKind = provider.parse()?;
            let switched = stack.locks.switch_provider(kind).await?;
            json!({
                "provider": kind,
                "switched": switched,
                "status": stack.locks.provider_status().await,
            })
        }
        Command::Available { provider } => {
            let kind: ProviderKind = provider.parse()?;
            json!({
                "provider": kind,
                "available": stack.locks.is_provider_available(kind).await,
            })
        }
        Command::ForceUnlock { key, provider } => {
            let released = match provider {
                Some(name) => {
                    let kind: ProviderKind = name.parse()?;
                    stack.locks.force_unlock_with(kind, key).await?
                }
                None => stack.locks.force_unlock(key).await?,
            };
            if !released {
                warn!(key = %key, "Force unlock found no holder");
            }
            json!({ "key": key, "released": released })
        }
        Command::Demo => serde_json::to_value(demo(stack).await?)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use lockbank_lock::with_lock_owner;

    use super::*;
    use crate::model::Configuration;
    use crate::startup::build_stack;

    async fn stack() -> Stack {
        let configuration = Configuration::load("does/not/exist.yml", None, None).unwrap();
        build_stack(&configuration).await.unwrap()
    }

    #[tokio::test]
    async fn test_demo_scenario() {
        let stack = stack().await;
        let report = demo(&stack).await.unwrap();

        assert_eq!(report.opening.source, Amount::from_minor(100_000));
        assert_eq!(report.opening.target, Amount::from_minor(50_000));
        assert!(matches!(report.transfer, StepOutcome::Success(_)));
        assert_eq!(report.after_transfer.source, Amount::from_minor(90_000));
        assert_eq!(report.after_transfer.target, Amount::from_minor(60_000));

        match &report.withdrawal {
            StepOutcome::Failure(failure) => {
                assert_eq!(failure.kind, "insufficient_funds");
                assert_eq!(failure.code, 25001);
                assert!(!failure.retryable);
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }
        assert_eq!(report.closing.source, Amount::from_minor(90_000));
        assert_eq!(report.closing.target, Amount::from_minor(60_000));
        assert_eq!(report.closing.total, report.opening.total);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["closing"]["source"], "900.00");
        assert_eq!(json["withdrawal"]["outcome"], "failure");
    }

    #[tokio::test]
    async fn test_switch_and_status() {
        let stack = stack().await;
        let value = execute(
            &Command::Switch {
                provider: "coordination-service".to_string(),
            },
            &stack,
        )
        .await
        .unwrap();
        assert_eq!(value["switched"], true);
        assert_eq!(value["status"]["currentProvider"], "coordination-service");

        let value = execute(&Command::Status, &stack).await.unwrap();
        assert_eq!(value["status"]["currentProvider"], "coordination-service");
    }

    #[tokio::test]
    async fn test_available_follows_backend() {
        let stack = stack().await;
        let command = Command::Available {
            provider: "cache".to_string(),
        };
        assert_eq!(execute(&command, &stack).await.unwrap()["available"], true);

        stack.memory_store.as_ref().unwrap().set_available(false);
        assert_eq!(execute(&command, &stack).await.unwrap()["available"], false);
    }

    #[tokio::test]
    async fn test_force_unlock_releases_foreign_lock() {
        let stack = stack().await;
        let locks = stack.locks.clone();
        let acquired = with_lock_owner("other-replica", async move {
            locks
                .try_lock(
                    "account:ACC001",
                    std::time::Duration::from_millis(100),
                    std::time::Duration::from_secs(30),
                )
                .await
        })
        .await
        .unwrap();
        assert!(acquired);

        let value = execute(
            &Command::ForceUnlock {
                key: "account:ACC001".to_string(),
                provider: None,
            },
            &stack,
        )
        .await
        .unwrap();
        assert_eq!(value["released"], true);
        assert!(!stack.locks.is_locked("account:ACC001").await);
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let stack = stack().await;
        let result = execute(
            &Command::Switch {
                provider: "etcd".to_string(),
            },
            &stack,
        )
        .await;
        assert!(result.is_err());
    }
}
