//! In-flight request de-duplication.
//!
//! An [`InFlightRegistry`] maps caller-chosen keys to the shared result of a
//! running operation. A second caller arriving with a key that is still
//! running gets the same pending result instead of starting another
//! operation. Each entry removes itself when its operation settles, so the
//! key is free for a fresh call right after.
//!
//! The registry is owned by whoever creates it (each [`crate::Client`] owns
//! one), which keeps its lifetime tied to the application and lets tests
//! start from an empty registry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A pending result that any number of callers can await.
pub type Pending<T> = Shared<BoxFuture<'static, T>>;

/// Registry of keyed, in-flight operations.
///
/// # Examples
///
/// ```
/// use rollcall::dedup::InFlightRegistry;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = InFlightRegistry::<u32>::new();
///
/// let first = registry.run("profile", || async { 7 });
/// // Joins the first call; this closure never runs.
/// let second = registry.run("profile", || async { 8 });
///
/// assert_eq!(first.await, 7);
/// assert_eq!(second.await, 7);
/// assert!(registry.is_empty());
/// # }
/// ```
pub struct InFlightRegistry<T> {
    pending: Arc<DashMap<String, (u64, Pending<T>)>>,
    next_id: Arc<AtomicU64>,
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the pending result for `key`, starting `operation` only if no
    /// call with that key is running.
    ///
    /// Registration happens before this returns. The operation is driven on
    /// the tokio runtime, so it runs to completion and frees its key even if
    /// every caller drops the returned future.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn run<F, Fut>(&self, key: impl Into<String>, operation: F) -> Pending<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let key = key.into();

        let (pending, started) = match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(key = %key, "Joining in-flight request");
                (entry.get().1.clone(), false)
            }
            Entry::Vacant(entry) => {
                let registry = Arc::clone(&self.pending);
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let cleanup_key = key.clone();
                let future = operation();
                let pending = async move {
                    let output = future.await;
                    // a later call may own the key if the registry was cleared
                    registry.remove_if(&cleanup_key, |_, (owner, _)| *owner == id);
                    output
                }
                .boxed()
                .shared();
                entry.insert((id, pending.clone()));
                (pending, true)
            }
        };

        if started {
            tokio::spawn(pending.clone());
        }

        pending
    }

    /// Returns `true` if a call with `key` is running.
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// The number of running calls.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no call is running.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forgets every running call. Callers already waiting keep their result;
    /// new callers start fresh operations.
    pub fn clear(&self) {
        self.pending.clear();
    }
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for InFlightRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn same_key_shares_one_execution() {
        let registry = InFlightRegistry::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<u32>();

        let first = {
            let calls = calls.clone();
            registry.run("attendance", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.await.unwrap_or(0)
            })
        };
        let second = {
            let calls = calls.clone();
            registry.run("attendance", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                99
            })
        };

        assert!(registry.is_pending("attendance"));
        assert_eq!(registry.len(), 1);

        release.send(7).unwrap();
        let (a, b) = tokio::join!(first, second);

        assert_eq!((a, b), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.is_pending("attendance"));
    }

    #[tokio::test]
    async fn key_is_reusable_after_settling() {
        let registry = InFlightRegistry::<u32>::new();

        assert_eq!(registry.run("tasks", || async { 1 }).await, 1);
        assert_eq!(registry.run("tasks", || async { 2 }).await, 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_interfere() {
        let registry = InFlightRegistry::<&'static str>::new();

        let a = registry.run("a", || async { "a" });
        let b = registry.run("b", || async { "b" });
        assert_eq!(registry.len(), 2);

        assert_eq!(tokio::join!(a, b), ("a", "b"));
    }

    #[tokio::test]
    async fn abandoned_calls_still_complete_and_clean_up() {
        let registry = InFlightRegistry::<u32>::new();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        drop(registry.run("orphan", move || async move {
            let _ = done_tx.send(());
            5
        }));

        done_rx.await.unwrap();
        // the spawned driver removes the key right after the operation returns
        for _ in 0..10 {
            if registry.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn clear_forgets_running_calls() {
        let registry = InFlightRegistry::<u32>::new();
        let (_release, gate) = oneshot::channel::<u32>();

        let _pending = registry.run("slow", move || async move { gate.await.unwrap_or(0) });
        assert!(registry.is_pending("slow"));

        registry.clear();
        assert!(!registry.is_pending("slow"));
    }
}
