use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A 64-bit counter with fixed acquire/release semantics.
///
/// Read-modify-write operations use `AcqRel`, loads use `Acquire` and stores
/// use `Release`. Callers never pick an ordering, so a counter update always
/// publishes the writes that preceded it.
///
/// `new` is `const`, so counters can live in statics (for example a
/// process-wide id allocator).
#[derive(Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Creates a counter holding `value`.
    pub const fn new(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn store(&self, value: u64) {
        self.value.store(value, Ordering::Release);
    }

    /// Adds `delta`, returning the previous value.
    pub fn fetch_add(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::AcqRel)
    }

    /// Subtracts `delta`, returning the previous value.
    ///
    /// Underflow is a logic error. Debug builds panic on it.
    pub fn fetch_sub(&self, delta: u64) -> u64 {
        let previous = self.value.fetch_sub(delta, Ordering::AcqRel);
        debug_assert!(previous >= delta, "AtomicCounter underflow");
        previous
    }

    /// Increments by one and returns the new value.
    pub fn increment(&self) -> u64 {
        self.fetch_add(1) + 1
    }

    /// Decrements by one and returns the new value.
    pub fn decrement(&self) -> u64 {
        self.fetch_sub(1).wrapping_sub(1)
    }

    /// Stores `new` if the counter holds `current`.
    ///
    /// Returns the previous value on success, or the value actually observed
    /// on failure.
    pub fn compare_exchange(&self, current: u64, new: u64) -> Result<u64, u64> {
        self.value
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Stores `value` if it is larger than the current value.
    ///
    /// Returns the previous value.
    pub fn fetch_max(&self, value: u64) -> u64 {
        self.value.fetch_max(value, Ordering::AcqRel)
    }
}

impl fmt::Debug for AtomicCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCounter").field(&self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_increment_and_decrement() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.decrement(), 1);
        assert_eq!(counter.load(), 1);
    }

    #[test]
    fn test_compare_exchange() {
        let counter = AtomicCounter::new(5);
        assert_eq!(counter.compare_exchange(5, 7), Ok(5));
        assert_eq!(counter.compare_exchange(5, 9), Err(7));
        assert_eq!(counter.load(), 7);
    }

    #[test]
    fn test_fetch_max() {
        let counter = AtomicCounter::new(3);
        counter.fetch_max(2);
        assert_eq!(counter.load(), 3);
        counter.fetch_max(10);
        assert_eq!(counter.load(), 10);
    }

    #[test]
    fn test_static_counter() {
        static COUNTER: AtomicCounter = AtomicCounter::new(100);
        let first = COUNTER.increment();
        assert!(first > 100);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = Arc::new(AtomicCounter::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(), 8000);
    }
}
