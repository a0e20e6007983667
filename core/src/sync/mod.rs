//! Cross-thread synchronization primitives.
//!
//! These are the only coordination mechanisms the Tessera crates use between
//! threads. They are thin, `parking_lot`-backed wrappers that add what the
//! graphics layer needs on top of a plain lock:
//!
//! - [`Mutex`]: non-reentrant exclusive lock with timed acquisition. Debug
//!   builds panic when the holding thread tries to lock again.
//! - [`AtomicCounter`]: an integer whose operations always use
//!   acquire/release ordering.
//! - [`Semaphore`]: counting semaphore.
//! - [`Event`]: manual-reset event.
//! - [`ThreadLocal`]: per-thread values keyed by a process-wide [`SlotKey`].
//!
//! Every timed wait returns a [`WaitResult`] so a timeout is never mistaken
//! for success.

mod atomic;
mod event;
mod mutex;
mod semaphore;
mod tls;

use std::time::{Duration, Instant};

pub use atomic::AtomicCounter;
pub use event::Event;
pub use mutex::{LockTimeout, Mutex, MutexGuard};
pub use semaphore::Semaphore;
pub use tls::{SlotKey, ThreadLocal};

/// Outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitResult {
    /// The awaited condition became true before the deadline.
    Signaled,
    /// The deadline passed first.
    TimedOut,
}

impl WaitResult {
    /// Returns `true` for [`WaitResult::Signaled`].
    pub fn is_signaled(self) -> bool {
        matches!(self, Self::Signaled)
    }

    /// Returns `true` for [`WaitResult::TimedOut`].
    pub fn is_timed_out(self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Block until the condition holds.
    Infinite,
    /// Give up after the duration. `Duration::ZERO` polls once.
    After(Duration),
}

impl Timeout {
    /// Poll without blocking.
    pub const ZERO: Self = Self::After(Duration::ZERO);

    /// Convert to an absolute deadline, `None` meaning "never".
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            // Durations too large to represent as an instant behave as infinite.
            Self::After(duration) => Instant::now().checked_add(duration),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::After(duration)
    }
}
