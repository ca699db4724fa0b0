//! Async mutual exclusion for the device-reset sequence.
//!
//! The reset sequence (deactivate capture, stop the source, clear playback,
//! rebuild device handles, optionally restart capture) must never overlap
//! itself. [`ResetLock`] serializes it with an explicit FIFO wait queue built
//! on oneshot channels, so fairness does not depend on scheduler wake order.
//! Ownership is an RAII guard: a reset that fails
//! partway still releases the lock when the guard drops.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Default)]
struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// FIFO-fair async mutex guarding the device-reset critical section.
#[derive(Clone, Default)]
pub struct ResetLock {
    state: Arc<Mutex<LockState>>,
}

/// Exclusive ownership of the reset critical section.
///
/// Dropping the guard hands the lock to the longest-waiting acquirer, or
/// frees it if nobody is waiting.
pub struct ResetGuard {
    state: Arc<Mutex<LockState>>,
}

impl ResetLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, suspending until no other holder is active.
    ///
    /// Waiters are granted ownership in acquisition order.
    pub async fn acquire(&self) -> ResetGuard {
        let waiter = {
            let mut state = self.state.lock();
            if state.locked {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.locked = true;
                None
            }
        };

        if let Some(rx) = waiter {
            // The sender is only dropped if the previous holder skipped us as
            // a cancelled waiter, which cannot happen while we are awaiting.
            let _ = rx.await;
        }

        ResetGuard {
            state: self.state.clone(),
        }
    }
}

impl Drop for ResetGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        loop {
            match state.waiters.pop_front() {
                // Ownership transfers directly; `locked` stays true.
                Some(next) => {
                    if next.send(()).is_ok() {
                        return;
                    }
                    // Waiter cancelled its acquire; skip to the next one.
                }
                None => {
                    state.locked = false;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_uncontended_acquire() {
        let lock = ResetLock::new();
        let guard = lock.acquire().await;
        drop(guard);
        let _guard = lock.acquire().await;
    }

    #[tokio::test]
    async fn test_critical_sections_never_overlap() {
        let lock = ResetLock::new();
        let inside = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::new();

        for _ in 0..8 {
            let lock = lock.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = lock.acquire().await;
                assert!(!inside.swap(true, Ordering::SeqCst), "overlapping section");
                tokio::task::yield_now().await;
                inside.store(false, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_fifo_ordering() {
        let lock = ResetLock::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<usize>();

        // Hold the lock while the waiters queue up in a known order.
        let holder = lock.acquire().await;
        let mut tasks = Vec::new();
        for i in 0..5 {
            let lock = lock.clone();
            let done_tx = done_tx.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = lock.acquire().await;
                done_tx.send(i).unwrap();
            }));
            // Let task i reach the wait queue before spawning i + 1.
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        drop(holder);

        for expected in 0..5 {
            assert_eq!(done_rx.recv().await, Some(expected));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_release_on_failure_path() {
        let lock = ResetLock::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let failing = {
            let lock = lock.clone();
            let attempts = attempts.clone();
            tokio::spawn(async move {
                let _guard = lock.acquire().await;
                attempts.fetch_add(1, Ordering::SeqCst);
                // Simulated device-init failure: early return drops the guard.
                Err::<(), &str>("permission denied")
            })
        };
        let _ = failing.await.unwrap();

        // The lock must be free again despite the failure.
        let _guard = lock.acquire().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
