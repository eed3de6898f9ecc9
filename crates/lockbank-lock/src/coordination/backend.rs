use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::client::{CoordinationClient, split_path};
use crate::error::{LockError, Result};
use crate::model::ProviderKind;
use crate::provider::LockBackend;

const NODE_PREFIX: &str = "lock-";

/// Coordination lock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationLockConfig {
    /// Root path under which each lock key gets a parent node
    pub root: String,
    /// Upper bound on a single wait for a change notification
    pub poll_interval: Duration,
}

impl Default for CoordinationLockConfig {
    fn default() -> Self {
        Self {
            root: "/locks".to_string(),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Closes the session of a node that never became the holder
struct PendingNode {
    client: Arc<dyn CoordinationClient>,
    session: Option<String>,
}

impl PendingNode {
    /// Keep the session alive; the node now holds the lock
    fn keep(mut self) {
        self.session = None;
    }

    async fn abandon(mut self) {
        if let Some(session) = self.session.take()
            && let Err(e) = self.client.close_session(&session).await
        {
            warn!(session = %session, error = %e, "Failed to close abandoned lock session");
        }
    }
}

impl Drop for PendingNode {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // Acquisition was cancelled mid-wait; the session would otherwise
        // keep its node in the queue until it expires.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            runtime.spawn(async move {
                let _ = client.close_session(&session).await;
            });
        }
    }
}

/// Lock backend using ephemeral sequential nodes
///
/// The holder is the owner of the lowest-sequence child under the key's
/// parent node. Every acquisition opens its own session. While queued, the
/// session outlives the whole wait; once the node is first, the session is
/// renewed with TTL = lease, so a crashed or stalled holder loses the lock
/// when the session expires.
/// The holder token is `"{session}#{node path}"`.
pub struct CoordinationLockBackend {
    client: Arc<dyn CoordinationClient>,
    config: CoordinationLockConfig,
}

impl CoordinationLockBackend {
    pub fn new(client: Arc<dyn CoordinationClient>, config: CoordinationLockConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &CoordinationLockConfig {
        &self.config
    }

    fn parent_path(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.config.root.trim_end_matches('/'),
            key.replace('/', "%2F")
        )
    }

    /// Whether the node named by `token` is first in line under `key`
    async fn holds(&self, key: &str, token: &str) -> Result<bool> {
        let Some((_, path)) = token.split_once('#') else {
            return Ok(false);
        };
        let Some((_, name)) = split_path(path) else {
            return Ok(false);
        };
        let snapshot = self.client.children(&self.parent_path(key)).await?;
        Ok(snapshot.first() == Some(name))
    }
}

#[async_trait]
impl LockBackend for CoordinationLockBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CoordinationService
    }

    async fn acquire(&self, key: &str, wait: Duration, lease: Duration) -> Result<Option<String>> {
        let parent = self.parent_path(key);
        let deadline = Instant::now() + wait;

        // A waiter's node must survive until its own deadline, even when the lease is shorter
        let queue_ttl = lease.max(wait) + self.config.poll_interval;
        let session = self.client.create_session(queue_ttl).await?;
        let pending = PendingNode {
            client: self.client.clone(),
            session: Some(session.clone()),
        };
        let path = self
            .client
            .create_ephemeral_sequential(&parent, NODE_PREFIX, &session)
            .await?;
        let Some((_, name)) = split_path(&path) else {
            pending.abandon().await;
            return Err(LockError::Backend(format!("malformed node path {path}")));
        };

        loop {
            let snapshot = self.client.children(&parent).await?;

            if snapshot.first() == Some(name) {
                // Lease runs from the moment of acquisition, not from queueing
                self.client.renew_session(&session, lease).await?;
                pending.keep();
                debug!(key = %key, node = %path, "Coordination lock acquired");
                return Ok(Some(format!("{session}#{path}")));
            }

            if !snapshot.contains(name) {
                pending.abandon().await;
                return Err(LockError::Backend(format!(
                    "lock node {path} vanished while waiting"
                )));
            }

            let now = Instant::now();
            if now >= deadline {
                pending.abandon().await;
                return Ok(None);
            }

            let pause = (deadline - now).min(self.config.poll_interval);
            self.client
                .wait_for_change(&parent, snapshot.version, pause)
                .await?;
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        if !self.holds(key, token).await? {
            return Ok(false);
        }
        let Some((session, path)) = token.split_once('#') else {
            return Ok(false);
        };
        let deleted = self.client.delete(path).await?;
        self.client.close_session(session).await?;
        Ok(deleted)
    }

    async fn is_holder(&self, key: &str, token: &str) -> Result<bool> {
        self.holds(key, token).await
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        let snapshot = self.client.children(&self.parent_path(key)).await?;
        Ok(!snapshot.children.is_empty())
    }

    async fn force_release(&self, key: &str) -> Result<bool> {
        let parent = self.parent_path(key);
        let snapshot = self.client.children(&parent).await?;
        match snapshot.first() {
            Some(holder) => self.client.delete(&format!("{parent}/{holder}")).await,
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }
}
