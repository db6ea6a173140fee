//! Worker pool for connection handlers.
//!
//! A single pool is shared by every channel listener. It bounds how many
//! handlers run at once and tracks them so shutdown can wait for in-flight
//! exchanges to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;

use crate::error::ServerError;

/// Bounded, elastic pool of handler execution contexts.
#[derive(Clone)]
pub struct WorkerPool {
    min: usize,
    max: usize,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
}

/// A reserved handler slot. Dropping it returns the slot to the pool.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    /// Create a pool running at most `max` handlers concurrently.
    ///
    /// `min` is the number of runtime worker threads kept available for
    /// handlers; see [`WorkerPool::min`].
    pub fn new(min: usize, max: usize) -> Result<Self, ServerError> {
        if min == 0 || min > max {
            return Err(ServerError::PoolSize { min, max });
        }

        Ok(Self {
            min,
            max,
            slots: Arc::new(Semaphore::new(max)),
            tracker: TaskTracker::new(),
        })
    }

    /// Minimum concurrency, used to size the runtime's worker threads.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Maximum number of handlers running at once.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Number of handlers currently running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for a free slot.
    ///
    /// Fails only after the pool has been closed.
    pub async fn reserve(&self) -> Result<Slot, AcquireError> {
        let permit = Arc::clone(&self.slots).acquire_owned().await?;
        Ok(Slot { _permit: permit })
    }

    /// Run `task` in its own execution context, holding `slot` until it
    /// completes.
    pub fn submit<F>(&self, slot: Slot, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            task.await;
            drop(slot);
        });
    }

    /// Stop handing out slots. Handlers already running are unaffected.
    pub fn close(&self) {
        self.slots.close();
        self.tracker.close();
    }

    /// Wait up to `grace` for running handlers to finish.
    ///
    /// Returns `true` if every handler completed.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(
            WorkerPool::new(0, 10),
            Err(ServerError::PoolSize { min: 0, max: 10 })
        ));
        assert!(matches!(
            WorkerPool::new(20, 10),
            Err(ServerError::PoolSize { min: 20, max: 10 })
        ));
        assert!(WorkerPool::new(20, 100).is_ok());
    }

    #[tokio::test]
    async fn test_slots_are_bounded() {
        let pool = WorkerPool::new(1, 2).unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let slot = pool.reserve().await.unwrap();
        pool.submit(slot, async move {
            let _ = release_rx.await;
        });
        let _held = pool.reserve().await.unwrap();
        assert_eq!(pool.active(), 1);

        // Pool is full until the running task finishes.
        let third = tokio::time::timeout(Duration::from_millis(50), pool.reserve()).await;
        assert!(third.is_err());

        release_tx.send(()).unwrap();
        let third = tokio::time::timeout(Duration::from_secs(5), pool.reserve()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_drain_waits_for_handlers() {
        let pool = WorkerPool::new(1, 4).unwrap();
        let (done_tx, done_rx) = oneshot::channel();

        let slot = pool.reserve().await.unwrap();
        pool.submit(slot, async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = done_tx.send(());
        });

        pool.close();
        assert!(pool.drain(Duration::from_secs(5)).await);
        assert!(done_rx.await.is_ok());
        assert!(pool.reserve().await.is_err());
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_grace() {
        let pool = WorkerPool::new(1, 4).unwrap();
        let slot = pool.reserve().await.unwrap();
        pool.submit(slot, std::future::pending());

        pool.close();
        assert!(!pool.drain(Duration::from_millis(20)).await);
    }
}
