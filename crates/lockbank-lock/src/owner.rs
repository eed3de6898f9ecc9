//! Owner identity for lock handles
//!
//! Async tasks migrate between worker threads, so the "current thread" of a
//! lock holder is modelled as an owner string carried in a task-local scope.
//! Code outside any scope falls back to the OS thread id.
//!
//! Task-locals do not cross `tokio::spawn`; a spawned task that must release
//! a lock has to re-enter the owner's scope with [`with_lock_owner`].

use std::future::Future;

tokio::task_local! {
    static LOCK_OWNER: String;
}

/// Run `fut` with `owner` as the identity recorded on every lock it acquires
pub async fn with_lock_owner<F>(owner: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    LOCK_OWNER.scope(owner.into(), fut).await
}

/// Owner identity of the calling context
pub fn current_owner() -> String {
    LOCK_OWNER
        .try_with(|owner| owner.clone())
        .unwrap_or_else(|_| format!("{:?}", std::thread::current().id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scoped_owner() {
        let owner = with_lock_owner("transfer-1", async { current_owner() }).await;
        assert_eq!(owner, "transfer-1");
    }

    #[tokio::test]
    async fn test_nested_scopes() {
        let (outer, inner) = with_lock_owner("outer", async {
            let inner = with_lock_owner("inner", async { current_owner() }).await;
            (current_owner(), inner)
        })
        .await;
        assert_eq!(outer, "outer");
        assert_eq!(inner, "inner");
    }

    #[test]
    fn test_fallback_is_thread_id() {
        let owner = current_owner();
        assert!(owner.starts_with("ThreadId("));
    }
}
