use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Children of a parent node at a given change version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenSnapshot {
    /// Bumped every time a child is created or removed under the parent
    pub version: u64,
    /// Child node names in sequence order
    pub children: Vec<String>,
}

impl ChildrenSnapshot {
    pub fn first(&self) -> Option<&str> {
        self.children.first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.iter().any(|c| c == name)
    }
}

/// Operations of a hierarchical coordination service used by the lock
///
/// Nodes are addressed by slash-separated paths. Ephemeral nodes belong to a
/// session and disappear when the session is closed or expires.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Open a session that expires after `ttl` unless renewed
    async fn create_session(&self, ttl: Duration) -> Result<String>;

    /// Push a live session's expiry to `ttl` from now; `false` if it is gone
    async fn renew_session(&self, session: &str, ttl: Duration) -> Result<bool>;

    /// Close a session, deleting every ephemeral node it owns
    async fn close_session(&self, session: &str) -> Result<()>;

    /// Create `parent/prefix<sequence>` owned by `session`; returns the full path
    async fn create_ephemeral_sequential(
        &self,
        parent: &str,
        prefix: &str,
        session: &str,
    ) -> Result<String>;

    /// Children of `parent`, ordered by sequence
    async fn children(&self, parent: &str) -> Result<ChildrenSnapshot>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn delete(&self, path: &str) -> Result<bool>;

    /// Wait until the children of `parent` differ from `since_version`
    ///
    /// Returns `false` if `timeout` elapsed with no change.
    async fn wait_for_change(&self, parent: &str, since_version: u64, timeout: Duration)
    -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Split `parent/name` into its parts
pub(crate) fn split_path(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('/').filter(|(_, name)| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("/locks/account:A/lock-0000000001"),
            Some(("/locks/account:A", "lock-0000000001"))
        );
        assert_eq!(split_path("/locks/"), None);
        assert_eq!(split_path("no-slash"), None);
    }

    #[test]
    fn test_snapshot_first() {
        let snapshot = ChildrenSnapshot {
            version: 3,
            children: vec!["lock-1".to_string(), "lock-2".to_string()],
        };
        assert_eq!(snapshot.first(), Some("lock-1"));
        assert!(snapshot.contains("lock-2"));
        assert!(ChildrenSnapshot::default().first().is_none());
    }
}
