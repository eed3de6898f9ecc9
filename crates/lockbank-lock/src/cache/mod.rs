//! Cache-based lock provider
//!
//! A lock is a key in a shared fast store, written with "set if absent"
//! and an expiry equal to the lease. The stored value is a holder token
//! issued per acquisition; release is a compare-and-delete on that token.

mod backend;
mod redis;
mod store;

pub use backend::{CacheLockBackend, CacheLockConfig};
pub use redis::RedisKvStore;
pub use store::{KvStore, MemoryKvStore};
