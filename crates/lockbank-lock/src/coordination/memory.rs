//! In-process coordination service
//!
//! Models the parts of a hierarchical coordination service the lock needs:
//! expiring sessions, ephemeral sequential children, and change
//! notification per parent. Shared between simulated replicas via `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use super::client::{ChildrenSnapshot, CoordinationClient, split_path};
use crate::error::{LockError, Result};

struct Session {
    expires_at: Instant,
    /// (parent, child name) pairs owned by this session
    nodes: BTreeSet<(String, String)>,
}

struct ParentNode {
    /// child name -> owning session
    children: BTreeMap<String, String>,
    version: u64,
    changes: watch::Sender<u64>,
}

impl ParentNode {
    fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            children: BTreeMap::new(),
            version: 0,
            changes,
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        self.changes.send_replace(self.version);
    }

    fn remove_child(&mut self, name: &str) -> Option<String> {
        let session = self.children.remove(name)?;
        self.bump();
        Some(session)
    }

    fn is_idle(&self) -> bool {
        self.children.is_empty() && self.changes.receiver_count() == 0
    }
}

#[derive(Default)]
struct TreeState {
    sessions: HashMap<String, Session>,
    parents: HashMap<String, ParentNode>,
    /// Shared by all parents so sequence numbers never repeat after a parent is pruned
    next_sequence: u64,
}

impl TreeState {
    fn parent_mut(&mut self, parent: &str) -> &mut ParentNode {
        self.parents
            .entry(parent.to_string())
            .or_insert_with(ParentNode::new)
    }

    /// Remove `parent` once it has no children and nobody is watching it
    fn prune(&mut self, parent: &str) {
        if self.parents.get(parent).is_some_and(ParentNode::is_idle) {
            self.parents.remove(parent);
        }
    }

    fn drop_session(&mut self, session_id: &str) {
        let Some(session) = self.sessions.remove(session_id) else {
            return;
        };
        for (parent, name) in session.nodes {
            if let Some(node) = self.parents.get_mut(&parent) {
                node.remove_child(&name);
            }
            self.prune(&parent);
        }
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            debug!(session = %id, "Coordination session expired");
            self.drop_session(&id);
        }
    }
}

/// In-process coordination service with lazy session expiry
pub struct MemoryCoordinationService {
    state: Mutex<TreeState>,
    available: AtomicBool,
}

impl Default for MemoryCoordinationService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinationService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TreeState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the service going offline or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        let mut state = self.state.lock();
        state.purge_expired();
        state.sessions.len()
    }

    /// Number of parent nodes currently tracked
    pub fn parent_count(&self) -> usize {
        let mut state = self.state.lock();
        state.purge_expired();
        state.parents.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockError::Unavailable(
                "coordination service offline".to_string(),
            ))
        }
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinationService {
    async fn create_session(&self, ttl: Duration) -> Result<String> {
        self.check_available()?;
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.lock();
        state.purge_expired();
        state.sessions.insert(
            id.clone(),
            Session {
                expires_at: Instant::now() + ttl,
                nodes: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    async fn renew_session(&self, session: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock();
        state.purge_expired();
        match state.sessions.get_mut(session) {
            Some(s) => {
                s.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close_session(&self, session: &str) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock();
        state.drop_session(session);
        state.purge_expired();
        Ok(())
    }

    async fn create_ephemeral_sequential(
        &self,
        parent: &str,
        prefix: &str,
        session: &str,
    ) -> Result<String> {
        self.check_available()?;
        let mut state = self.state.lock();
        state.purge_expired();
        if !state.sessions.contains_key(session) {
            return Err(LockError::Backend(format!("session {session} has expired")));
        }

        state.next_sequence += 1;
        let name = format!("{prefix}{:010}", state.next_sequence);
        let node = state.parent_mut(parent);
        node.children.insert(name.clone(), session.to_string());
        node.bump();

        if let Some(s) = state.sessions.get_mut(session) {
            s.nodes.insert((parent.to_string(), name.clone()));
        }
        Ok(format!("{parent}/{name}"))
    }

    async fn children(&self, parent: &str) -> Result<ChildrenSnapshot> {
        self.check_available()?;
        let mut state = self.state.lock();
        state.purge_expired();
        Ok(state
            .parents
            .get(parent)
            .map(|node| ChildrenSnapshot {
                version: node.version,
                children: node.children.keys().cloned().collect(),
            })
            .unwrap_or_default())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.check_available()?;
        let Some((parent, name)) = split_path(path) else {
            return Ok(false);
        };
        let mut state = self.state.lock();
        state.purge_expired();
        Ok(state
            .parents
            .get(parent)
            .is_some_and(|node| node.children.contains_key(name)))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.check_available()?;
        let Some((parent, name)) = split_path(path) else {
            return Ok(false);
        };
        let mut state = self.state.lock();
        state.purge_expired();
        let Some(session) = state
            .parents
            .get_mut(parent)
            .and_then(|node| node.remove_child(name))
        else {
            return Ok(false);
        };
        if let Some(s) = state.sessions.get_mut(&session) {
            s.nodes.remove(&(parent.to_string(), name.to_string()));
        }
        state.prune(parent);
        Ok(true)
    }

    async fn wait_for_change(
        &self,
        parent: &str,
        since_version: u64,
        timeout: Duration,
    ) -> Result<bool> {
        self.check_available()?;
        let mut changes = {
            let mut state = self.state.lock();
            state.purge_expired();
            let node = state.parent_mut(parent);
            if node.version != since_version {
                state.prune(parent);
                return Ok(true);
            }
            node.changes.subscribe()
        };

        let changed = matches!(
            tokio::time::timeout(timeout, changes.changed()).await,
            Ok(Ok(()))
        );
        drop(changes);
        self.state.lock().prune(parent);
        Ok(changed)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
