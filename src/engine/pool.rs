//! Bounded worker pool for [`crate::handle::Handle::get`] (§4.6, §5).
//!
//! Grounded on `memory.rs`'s `MemoryManager`/`Notify`-gated bounded pool,
//! generalized from a physical buffer pool (fixed-size byte slabs) to a
//! logical concurrency permit, since HDF5 chunk byte sizes are not uniform
//! the way the teacher's 16 MiB slabs are.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};

/// Caps the number of chunk tasks running concurrently for one
/// `Handle::get` call (default 100, §4.6, configurable via
/// [`crate::config::Config`]).
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Acquire a permit, blocking until one is available. The semaphore is
    /// never closed during normal operation, so this only fails if the pool
    /// itself has been torn down.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("worker pool semaphore should never be closed during a call")
    }

    /// Same as [`acquire`](Self::acquire) but `'static`, for permits held
    /// across a `tokio::spawn`ed chunk task rather than within the caller's
    /// own stack frame.
    pub async fn acquire_owned(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore should never be closed during a call")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_concurrent_permits() {
        let pool = WorkerPool::new(2);
        let _a = pool.acquire().await;
        let _b = pool.acquire().await;
        assert_eq!(pool.semaphore.available_permits(), 0);
    }
}
