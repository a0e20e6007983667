use std::fmt;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{Timeout, WaitResult};

/// Counting semaphore.
///
/// `acquire` takes one permit, blocking while none are available.
/// `release` never blocks.
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: parking_lot::const_mutex(permits),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until a permit is available and takes it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.condvar.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Takes a permit if one is available.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Blocks for at most `timeout` waiting for a permit.
    pub fn acquire_timeout(&self, timeout: Duration) -> WaitResult {
        self.acquire_for(Timeout::After(timeout))
    }

    /// Blocks until a permit is taken or the timeout elapses.
    pub fn acquire_for(&self, timeout: impl Into<Timeout>) -> WaitResult {
        let Some(deadline) = timeout.into().deadline() else {
            self.acquire();
            return WaitResult::Signaled;
        };

        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.condvar.wait_until(&mut permits, deadline).timed_out() {
                break;
            }
        }

        if *permits == 0 {
            return WaitResult::TimedOut;
        }
        *permits -= 1;
        WaitResult::Signaled
    }

    /// Adds `count` permits and wakes up to `count` waiters.
    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut permits = self.permits.lock();
        *permits += count;
        if count == 1 {
            self.condvar.notify_one();
        } else {
            self.condvar.notify_all();
        }
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_try_acquire_consumes_permits() {
        let semaphore = Semaphore::new(2);
        assert!(semaphore.try_acquire());
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());
        semaphore.release(1);
        assert_eq!(semaphore.available(), 1);
    }

    #[test]
    fn test_acquire_timeout_reports_timed_out() {
        let semaphore = Semaphore::new(0);
        assert_eq!(
            semaphore.acquire_timeout(Duration::from_millis(10)),
            WaitResult::TimedOut
        );
        assert_eq!(semaphore.available(), 0);
    }

    #[test]
    fn test_release_wakes_blocked_acquirer() {
        let semaphore = Arc::new(Semaphore::new(0));
        let waiter = {
            let semaphore = Arc::clone(&semaphore);
            thread::spawn(move || semaphore.acquire_for(Timeout::Infinite))
        };
        semaphore.release(1);
        assert_eq!(waiter.join().unwrap(), WaitResult::Signaled);
        assert_eq!(semaphore.available(), 0);
    }

    #[test]
    fn test_release_many() {
        let semaphore = Arc::new(Semaphore::new(0));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let semaphore = Arc::clone(&semaphore);
                thread::spawn(move || semaphore.acquire())
            })
            .collect();
        semaphore.release(3);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(semaphore.available(), 0);
    }
}
