//! Exclusive lock guarding a decoder's mutable state.
//!
//! Critical sections are dominated by file I/O, so readers and writers share a
//! single plain mutex.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct ExclusiveLock<T> {
    inner: Mutex<T>,
    acquisitions: AtomicU64,
    releases: AtomicU64,
}

/// Ownership token returned by [`ExclusiveLock::acquire`].
///
/// Dropping the guard releases the lock, so a release without a matching
/// acquisition cannot be expressed.
pub struct LockGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    lock: &'a ExclusiveLock<T>,
}

impl<T> ExclusiveLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            acquisitions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Blocks the calling thread until ownership is obtained.
    ///
    /// A body that panicked while holding the lock leaves the mutex poisoned;
    /// the guarded value is still taken back, since every writer keeps it
    /// structurally valid between statements.
    pub fn acquire(&self) -> LockGuard<'_, T> {
        let guard = self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("Exclusive lock was poisoned by a panicking holder; recovering");
            PoisonError::into_inner(poisoned)
        });
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        LockGuard { guard, lock: self }
    }

    /// Relinquishes ownership obtained from [`acquire`](Self::acquire).
    pub fn release(&self, guard: LockGuard<'_, T>) {
        debug_assert!(
            std::ptr::eq(guard.lock, self),
            "released a guard belonging to another lock"
        );
        drop(guard);
    }

    /// Runs `body` while holding the lock and hands back its outcome.
    ///
    /// The lock is released on every exit path, including an `Err` returned by
    /// `body` and unwinding out of it.
    pub fn scoped_execute<R>(&self, body: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.acquire();
        body(&mut guard)
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }
}

impl<T: Default> Default for ExclusiveLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        let released = self.lock.releases.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(
            released <= self.lock.acquisitions.load(Ordering::SeqCst),
            "exclusive lock released more often than it was acquired"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn scoped_execute_returns_body_outcome() {
        let lock = ExclusiveLock::new(41);
        let value = lock.scoped_execute(|value| {
            *value += 1;
            *value
        });
        assert_eq!(value, 42);
        assert_eq!(lock.acquisitions(), 1);
        assert_eq!(lock.releases(), 1);
    }

    #[test]
    fn failing_body_still_releases() {
        let lock = ExclusiveLock::new(Vec::<u32>::new());
        let outcome: Result<(), String> = lock.scoped_execute(|items| {
            items.push(1);
            Err("body failed".to_string())
        });
        assert_eq!(outcome, Err("body failed".to_string()));

        let len = lock.scoped_execute(|items| items.len());
        assert_eq!(len, 1);
        assert_eq!(lock.acquisitions(), lock.releases());
    }

    #[test]
    fn panicking_body_releases_and_lock_stays_usable() {
        let lock = ExclusiveLock::new(0_u32);
        let result = catch_unwind(AssertUnwindSafe(|| {
            lock.scoped_execute(|value| {
                *value = 7;
                panic!("decoder blew up");
            })
        }));
        assert!(result.is_err());

        assert_eq!(lock.scoped_execute(|value| *value), 7);
        assert_eq!(lock.acquisitions(), 2);
        assert_eq!(lock.releases(), 2);
    }

    #[test]
    fn explicit_acquire_and_release() {
        let lock = ExclusiveLock::new(String::from("a"));
        let mut guard = lock.acquire();
        guard.push('b');
        lock.release(guard);
        assert_eq!(lock.scoped_execute(|s| s.clone()), "ab");
        assert_eq!(lock.acquisitions(), lock.releases());
    }

    #[test]
    fn contended_scoped_execute_is_serialized() {
        const THREADS: u64 = 16;
        const ROUNDS: u64 = 200;

        let lock = Arc::new(ExclusiveLock::new(0_u64));
        let handles: Vec<_> = (0..THREADS)
            .map(|worker| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    let mut failures = 0;
                    for round in 0..ROUNDS {
                        let outcome: Result<(), ()> = lock.scoped_execute(|counter| {
                            let seen = *counter;
                            thread::yield_now();
                            *counter = seen + 1;
                            if (worker + round) % 3 == 0 {
                                Err(())
                            } else {
                                Ok(())
                            }
                        });
                        if outcome.is_err() {
                            failures += 1;
                        }
                    }
                    failures
                })
            })
            .collect();

        let failures: u64 = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .sum();

        assert!(failures > 0);
        assert_eq!(lock.scoped_execute(|counter| *counter), THREADS * ROUNDS);
        assert_eq!(lock.acquisitions(), THREADS * ROUNDS + 1);
        assert_eq!(lock.acquisitions(), lock.releases());
    }
}
