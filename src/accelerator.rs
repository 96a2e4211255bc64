//! Mutual exclusion for shared inference hardware.
//!
//! Accelerators (edge TPUs, GPUs) tolerate one caller at a time. The pool is
//! a fixed array of async mutexes, one per device slot; a perceptor bound to
//! slot `k` holds lock `k` only for the duration of its module invocation,
//! never for input/output adaptation. Indexes are validated at registration,
//! so acquisition itself cannot fail.

use tokio::sync::{Mutex, MutexGuard};

pub struct AcceleratorPool {
    locks: Vec<Mutex<()>>,
}

impl AcceleratorPool {
    /// Create a pool with `count` slots. A pool always has at least one slot.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let count = count.max(1);
        Self {
            locks: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.locks.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.locks.len()
    }

    /// Acquire slot `index`, waiting until the current holder releases it.
    /// The guard must span the module invocation and nothing more.
    pub async fn acquire(&self, index: usize) -> MutexGuard<'_, ()> {
        self.locks[index].lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_never_smaller_than_one() {
        assert_eq!(AcceleratorPool::new(0).count(), 1);
        assert_eq!(AcceleratorPool::new(3).count(), 3);
    }

    #[tokio::test]
    async fn same_slot_excludes_second_acquirer() {
        let pool = AcceleratorPool::new(2);
        let guard = pool.acquire(0).await;
        assert!(pool.locks[0].try_lock().is_err());
        assert!(pool.locks[1].try_lock().is_ok());
        drop(guard);
        assert!(pool.locks[0].try_lock().is_ok());
    }
}
