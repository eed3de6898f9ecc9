// Local lock-handle bookkeeping
// Sharded concurrent table keyed by lock key; unrelated keys never contend

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::LockHandle;

/// Outcome of releasing one reentrant hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldRelease {
    /// The caller owns no handle for the key
    NotHeld,
    /// Nested hold released; the lock stays held with this many holds
    Nested(u32),
    /// Last hold; the caller must release the lock externally
    Last,
}

/// Process-local table of the locks this provider instance believes it holds
#[derive(Default)]
pub struct HandleRegistry {
    handles: DashMap<String, LockHandle>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `key` if it is owned by `owner`
    pub fn owned_by(&self, key: &str, owner: &str) -> Option<LockHandle> {
        self.handles
            .get(key)
            .filter(|h| h.is_owned_by(owner))
            .map(|h| h.clone())
    }

    pub fn get(&self, key: &str) -> Option<LockHandle> {
        self.handles.get(key).map(|h| h.clone())
    }

    /// Record a freshly acquired lock, replacing any stale handle for the key
    pub fn insert(&self, handle: LockHandle) {
        self.handles.insert(handle.key.clone(), handle);
    }

    /// Add a reentrant hold if `owner` holds `key` under `token`
    pub fn reenter(&self, key: &str, owner: &str, token: &str) -> Option<u32> {
        let mut handle = self.handles.get_mut(key)?;
        if !handle.is_owned_by(owner) || handle.token != token {
            return None;
        }
        handle.hold_count += 1;
        Some(handle.hold_count)
    }

    /// Drop one hold of `owner` on `key`
    pub fn release_hold(&self, key: &str, owner: &str) -> HoldRelease {
        match self.handles.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let handle = entry.get_mut();
                if !handle.is_owned_by(owner) {
                    return HoldRelease::NotHeld;
                }
                if handle.hold_count > 1 {
                    handle.hold_count -= 1;
                    HoldRelease::Nested(handle.hold_count)
                } else {
                    HoldRelease::Last
                }
            }
            Entry::Vacant(_) => HoldRelease::NotHeld,
        }
    }

    /// Remove the handle for `key` only if it still carries `token`
    ///
    /// A concurrent worker may already have re-acquired the key and stored
    /// its own handle; that handle must survive.
    pub fn remove_token(&self, key: &str, token: &str) -> Option<LockHandle> {
        self.handles
            .remove_if(key, |_, h| h.token == token)
            .map(|(_, h)| h)
    }

    /// Remove the handle for `key` regardless of owner
    pub fn remove(&self, key: &str) -> Option<LockHandle> {
        self.handles.remove(key).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }
}
