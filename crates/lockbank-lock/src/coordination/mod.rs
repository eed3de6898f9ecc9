//! Coordination-service lock provider
//!
//! Each acquisition creates an ephemeral sequential child under the key's
//! parent node; the lowest sequence number holds the lock and the others
//! wait for the children to change.

mod backend;
mod client;
mod memory;

pub use backend::{CoordinationLockBackend, CoordinationLockConfig};
pub use client::{ChildrenSnapshot, CoordinationClient};
pub use memory::MemoryCoordinationService;
