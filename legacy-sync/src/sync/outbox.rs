//! Unit of work with after-commit hooks
//!
//! The write path stages its business rows and the matching sync job in one
//! unit of work. Both become visible on commit or vanish on rollback. Work
//! that must only happen once the data is durable is registered with
//! [`UnitOfWork::after_commit`] and runs right after a successful commit.

use super::job::SyncJob;
use crate::error::SyncResult;
use crate::store::{NewStore, Store};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

/// Deferred work run after a successful commit
pub type CommitHook = BoxFuture<'static, ()>;

/// Hooks registered on a unit of work, in registration order
#[derive(Default)]
pub struct CommitHooks {
    hooks: Vec<CommitHook>,
}

impl CommitHooks {
    /// Create an empty hook list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook
    pub fn push(&mut self, hook: impl Future<Output = ()> + Send + 'static) {
        self.hooks.push(Box::pin(hook));
    }

    /// Number of registered hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if no hooks are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in order. A panicking hook is logged and does not stop
    /// the others.
    pub async fn run(self) {
        for hook in self.hooks {
            if AssertUnwindSafe(hook).catch_unwind().await.is_err() {
                error!("After-commit hook panicked");
            }
        }
    }

    /// Drop every hook without running it. Returns how many were dropped.
    pub fn discard(self) -> usize {
        let count = self.hooks.len();
        if count > 0 {
            debug!(hooks = count, "Discarding after-commit hooks");
        }
        count
    }
}

impl fmt::Debug for CommitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitHooks")
            .field("len", &self.hooks.len())
            .finish()
    }
}

/// One atomic write on the store data
///
/// Dropping a unit of work without calling [`commit`](Self::commit) rolls it
/// back and discards its hooks.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Insert a store and assign its identity
    async fn insert_store(&mut self, store: &NewStore) -> SyncResult<Store>;

    /// Read a store as seen by this unit of work
    async fn load_store(&mut self, id: i64) -> SyncResult<Option<Store>>;

    /// Write back a loaded store, guarded by its version
    async fn update_store(&mut self, store: &Store) -> SyncResult<Store>;

    /// Stage a sync job to be persisted with this unit of work
    async fn stage_job(&mut self, job: &SyncJob) -> SyncResult<()>;

    /// Register work to run after a successful commit
    fn after_commit(&mut self, hook: CommitHook);

    /// Commit, then run the after-commit hooks
    ///
    /// The result reflects the commit only; hooks cannot fail it.
    async fn commit(self: Box<Self>) -> SyncResult<()>;

    /// Roll back and discard the hooks
    async fn rollback(self: Box<Self>) -> SyncResult<()>;
}

/// Source of units of work
#[async_trait]
pub trait Database: Send + Sync {
    /// Begin a new unit of work
    async fn begin(&self) -> SyncResult<Box<dyn UnitOfWork>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut hooks = CommitHooks::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            hooks.push(async move { order.lock().push(i) });
        }
        assert_eq!(hooks.len(), 3);

        hooks.run().await;
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_stop_others() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut hooks = CommitHooks::new();
        hooks.push(async { panic!("boom") });
        let counter = Arc::clone(&ran);
        hooks.push(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hooks.run().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_discard_does_not_run_hooks() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut hooks = CommitHooks::new();
        let counter = Arc::clone(&ran);
        hooks.push(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hooks.discard(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
