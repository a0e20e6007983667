use std::fmt;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{Timeout, WaitResult};

/// Manual-reset event.
///
/// Once signaled, the event stays signaled and releases every waiter until
/// [`reset`](Event::reset) is called.
pub struct Event {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    /// Creates an event in the given initial state.
    pub const fn new(signaled: bool) -> Self {
        Self {
            signaled: parking_lot::const_mutex(signaled),
            condvar: Condvar::new(),
        }
    }

    /// Signals the event and wakes all waiters.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.condvar.notify_all();
    }

    /// Returns the event to the non-signaled state.
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the event is signaled.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.condvar.wait(&mut signaled);
        }
    }

    /// Blocks until the event is signaled or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitResult {
        self.wait_for(Timeout::After(timeout))
    }

    /// Blocks until the event is signaled or the timeout elapses.
    pub fn wait_for(&self, timeout: impl Into<Timeout>) -> WaitResult {
        let Some(deadline) = timeout.into().deadline() else {
            self.wait();
            return WaitResult::Signaled;
        };

        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.condvar.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }

        if *signaled {
            WaitResult::Signaled
        } else {
            WaitResult::TimedOut
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
