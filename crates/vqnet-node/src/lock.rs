//! Locks used by the node protocols.
//!
//! [`AsyncLock`] is an ownerless binary lock: one request may acquire it and
//! a later, unrelated request may release it. Node global locks and
//! per-qubit locks are both built on it, because the two-qubit protocol
//! takes them on remote nodes through separate RPCs.

use rand::Rng;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Ownerless asynchronous binary lock.
#[derive(Debug)]
pub struct AsyncLock {
    permits: Semaphore,
}

impl AsyncLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(1),
        }
    }

    /// Create a lock that starts out held.
    pub fn new_locked() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    /// Wait until the lock is free and take it.
    pub async fn acquire(&self) {
        // The semaphore is never closed, so acquire cannot fail.
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }

    /// Take the lock if it is free.
    pub fn try_acquire(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Release the lock. Releasing a free lock does nothing.
    pub fn release(&self) {
        if self.permits.available_permits() == 0 {
            self.permits.add_permits(1);
        }
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Acquire and return a guard that releases on drop.
    pub async fn lock(&self) -> AsyncLockGuard<'_> {
        self.acquire().await;
        AsyncLockGuard { lock: self }
    }
}

impl Default for AsyncLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases an [`AsyncLock`] when dropped.
#[derive(Debug)]
pub struct AsyncLockGuard<'a> {
    lock: &'a AsyncLock,
}

impl Drop for AsyncLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Randomized backoff window for lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    min_ms: u64,
    max_ms: u64,
}

impl Backoff {
    /// Backoff drawn uniformly from `[min_ms, max_ms)`.
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }

    /// Draw the next delay.
    pub fn next_delay(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..self.max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_acquire_and_release() {
        let lock = AsyncLock::new();
        assert!(!lock.is_locked());
        assert!(lock.try_acquire());
        assert!(lock.is_locked());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_double_release_is_noop() {
        let lock = AsyncLock::new();
        lock.release();
        lock.release();
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
    }

    #[test]
    fn test_new_locked() {
        let lock = AsyncLock::new_locked();
        assert!(lock.is_locked());
        lock.release();
        assert!(lock.try_acquire());
    }

    #[tokio::test]
    async fn test_release_from_other_task_wakes_waiter() {
        let lock = Arc::new(AsyncLock::new());
        lock.acquire().await;

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire().await;
                true
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        lock.release();
        assert!(waiter.await.unwrap());
        assert!(lock.is_locked());
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let lock = AsyncLock::new();
        {
            let _guard = lock.lock().await;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_backoff_window() {
        let backoff = Backoff::new(10, 40);
        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay < Duration::from_millis(40));
        }
        assert_eq!(Backoff::new(5, 5).next_delay(), Duration::from_millis(5));
    }
}
