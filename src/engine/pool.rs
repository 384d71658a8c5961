// src/engine/pool.rs

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Bounded set of worker slots. A job holds one slot from dispatch until
/// its worker exits.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// `size` is clamped to at least 1.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a free slot. Fails once the pool is closed.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        let permit = Arc::clone(&self.slots).acquire_owned().await?;
        debug!(available = self.available(), "worker slot acquired");
        Ok(permit)
    }

    /// Refuse new acquisitions and wait until every held slot is returned.
    pub async fn close_and_drain(&self) {
        // The semaphore is FIFO: jobs already waiting for a slot run first.
        let all = u32::try_from(self.size).unwrap_or(u32::MAX);
        if let Ok(permits) = self.slots.acquire_many(all).await {
            permits.forget();
        }
        self.slots.close();
    }
}

/// One slot per available CPU.
pub fn default_size() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn size_is_at_least_one() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        let _slot = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquisitions() {
        let pool = WorkerPool::new(2);
        pool.close_and_drain().await;
        assert!(pool.acquire().await.is_err());
    }
}
