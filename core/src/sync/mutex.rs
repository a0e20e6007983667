use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use super::atomic::AtomicCounter;
use super::tls::current_thread_token;

/// Returned by [`Mutex::lock_timeout`] when the lock stayed contended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("lock not acquired within {0:?}")]
pub struct LockTimeout(pub Duration);

/// Exclusive lock with an RAII guard.
///
/// The lock is not reentrant. Locking it again from the thread that already
/// holds it would deadlock. In debug builds the mutex remembers its owner and
/// panics instead, which turns a hang into a readable failure.
pub struct Mutex<T> {
    /// Token of the holding thread, `0` when unlocked. Only maintained in
    /// debug builds.
    owner: AtomicCounter,
    inner: parking_lot::Mutex<T>,
}

impl<T> Mutex<T> {
    /// Creates a new unlocked mutex containing `value`.
    pub const fn new(value: T) -> Self {
        Self {
            owner: AtomicCounter::new(0),
            inner: parking_lot::const_mutex(value),
        }
    }

    /// Blocks until the lock is acquired.
    ///
    /// # Panics
    ///
    /// In debug builds, if the calling thread already holds the lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.check_reentry();
        self.guard(self.inner.lock())
    }

    /// Acquires the lock if it is free, without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock().map(|guard| self.guard(guard))
    }

    /// Blocks for at most `timeout` trying to acquire the lock.
    pub fn lock_timeout(&self, timeout: Duration) -> Result<MutexGuard<'_, T>, LockTimeout> {
        self.check_reentry();
        self.inner
            .try_lock_for(timeout)
            .map(|guard| self.guard(guard))
            .ok_or(LockTimeout(timeout))
    }

    /// Returns a mutable reference to the inner value.
    ///
    /// Since this requires `&mut self`, no locking is needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consumes the mutex and returns the inner value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    fn check_reentry(&self) {
        if cfg!(debug_assertions) {
            let token = current_thread_token();
            assert_ne!(
                self.owner.load(),
                token,
                "Mutex locked twice by the same thread"
            );
        }
    }

    fn guard<'a>(&'a self, guard: parking_lot::MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        if cfg!(debug_assertions) {
            self.owner.store(current_thread_token());
        }
        MutexGuard {
            owner: &self.owner,
            guard,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Some(guard) => f.debug_struct("Mutex").field("data", &*guard).finish(),
            None => f.debug_struct("Mutex").field("data", &"<locked>").finish(),
        }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Mutex<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// RAII guard that releases the [`Mutex`] on drop.
pub struct MutexGuard<'a, T> {
    owner: &'a AtomicCounter,
    guard: parking_lot::MutexGuard<'a, T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // Cleared before the inner guard unlocks, so the next owner never
        // sees a stale token.
        if cfg!(debug_assertions) {
            self.owner.store(0);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.guard, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_mutate() {
        let mutex = Mutex::new(Vec::new());
        mutex.lock().push(1);
        mutex.lock().push(2);
        assert_eq!(*mutex.lock(), vec![1, 2]);
    }

    #[test]
    fn test_try_lock_contended() {
        let mutex = Mutex::new(0);
        let _guard = mutex.lock();
        let other = thread::scope(|scope| scope.spawn(|| mutex.try_lock().is_none()).join());
        assert!(other.unwrap());
    }

    #[test]
    fn test_lock_timeout_expires() {
        let mutex = Arc::new(Mutex::new(0));
        let _guard = mutex.lock();
        let contender = Arc::clone(&mutex);
        let result = thread::spawn(move || {
            contender
                .lock_timeout(Duration::from_millis(20))
                .map(|_| ())
        })
        .join()
        .unwrap();
        assert_eq!(result, Err(LockTimeout(Duration::from_millis(20))));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let mutex = Mutex::new(5);
        {
            let mut guard = mutex.lock();
            *guard += 1;
        }
        assert!(mutex.try_lock().is_some());
        assert_eq!(mutex.into_inner(), 6);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Mutex locked twice by the same thread")]
    fn test_reentrant_lock_panics_in_debug() {
        let mutex = Mutex::new(());
        let _first = mutex.lock();
        let _second = mutex.lock();
    }

    #[test]
    fn test_concurrent_counting() {
        let mutex = Arc::new(Mutex::new(0u32));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..500 {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*mutex.lock(), 2000);
    }
}
