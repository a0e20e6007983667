use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use super::atomic::AtomicCounter;

/// Process-wide slot allocator. Keys are never reused.
static NEXT_SLOT: AtomicCounter = AtomicCounter::new(1);

/// Thread tokens start at 1 so that 0 can mean "no thread".
static NEXT_THREAD: AtomicCounter = AtomicCounter::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD.fetch_add(1);
    static SLOTS: RefCell<HashMap<SlotKey, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Small unique number identifying the calling thread for the lifetime of the
/// process.
pub(crate) fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// Process-wide handle of one thread-local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(u64);

impl SlotKey {
    fn allocate() -> Self {
        Self(NEXT_SLOT.fetch_add(1))
    }

    /// Raw key value.
    pub fn index(self) -> u64 {
        self.0
    }
}

/// Per-thread storage for values of type `T`.
///
/// Each `ThreadLocal` owns one [`SlotKey`]. Every thread sees its own value
/// in that slot, starting out empty. A thread's value is dropped when the
/// thread exits. Values stored by other threads are unaffected when this
/// handle is dropped, and stay until their threads exit.
///
/// # Example
///
/// ```
/// use tessera_core::sync::ThreadLocal;
///
/// let scratch = ThreadLocal::<Vec<u32>>::new();
/// scratch.with_or_init(Vec::new, |v| v.push(7));
/// assert_eq!(scratch.with(|v| v.map(|v| v.len())), Some(1));
/// ```
pub struct ThreadLocal<T: 'static> {
    key: SlotKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ThreadLocal<T> {
    pub fn new() -> Self {
        Self {
            key: SlotKey::allocate(),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> SlotKey {
        self.key
    }

    /// Stores `value` for the calling thread, returning the previous value.
    pub fn set(&self, value: T) -> Option<T> {
        let previous = SLOTS.with(|slots| slots.borrow_mut().insert(self.key, Box::new(value)));
        previous.and_then(Self::downcast)
    }

    /// Removes and returns the calling thread's value.
    pub fn take(&self) -> Option<T> {
        SLOTS
            .with(|slots| slots.borrow_mut().remove(&self.key))
            .and_then(Self::downcast)
    }

    /// Returns `true` if the calling thread has a value in this slot.
    pub fn is_set(&self) -> bool {
        SLOTS.with(|slots| slots.borrow().contains_key(&self.key))
    }

    /// Calls `f` with the calling thread's value, if any.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        // The value is moved out while `f` runs so that `f` may itself use
        // other thread-local slots.
        match self.take() {
            Some(value) => {
                let result = f(Some(&value));
                self.set(value);
                result
            }
            None => f(None),
        }
    }

    /// Calls `f` with the calling thread's value, creating it with `init`
    /// first if the slot is empty.
    pub fn with_or_init<R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let mut value = self.take().unwrap_or_else(init);
        let result = f(&mut value);
        self.set(value);
        result
    }

    fn downcast(boxed: Box<dyn Any>) -> Option<T> {
        boxed.downcast::<T>().ok().map(|value| *value)
    }
}

impl<T: 'static> Default for ThreadLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for ThreadLocal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocal").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Event;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_values_are_per_thread() {
        let slot = Arc::new(ThreadLocal::<u32>::new());
        slot.set(1);

        let other = Arc::clone(&slot);
        let seen = thread::spawn(move || {
            let before = other.with(|v| v.copied());
            other.set(2);
            (before, other.with(|v| v.copied()))
        })
        .join()
        .unwrap();

        assert_eq!(seen, (None, Some(2)));
        assert_eq!(slot.with(|v| v.copied()), Some(1));
    }

    #[test]
    fn test_slots_never_alias() {
        let a = ThreadLocal::<u32>::new();
        let b = ThreadLocal::<u32>::new();
        assert_ne!(a.key(), b.key());
        a.set(10);
        assert!(!b.is_set());
        b.set(20);
        assert_eq!(a.take(), Some(10));
        assert_eq!(b.take(), Some(20));
    }

    #[test]
    fn test_set_returns_previous() {
        let slot = ThreadLocal::<String>::new();
        assert_eq!(slot.set("a".into()), None);
        assert_eq!(slot.set("b".into()), Some("a".to_string()));
    }

    #[test]
    fn test_nested_slots_inside_with() {
        let outer = ThreadLocal::<u32>::new();
        let inner = ThreadLocal::<u32>::new();
        outer.set(1);
        outer.with(|_| {
            inner.set(2);
        });
        assert_eq!(inner.take(), Some(2));
        assert_eq!(outer.take(), Some(1));
    }

    struct DropSignal(Arc<Event>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            self.0.signal();
        }
    }

    #[test]
    fn test_value_dropped_at_thread_exit() {
        let slot = Arc::new(ThreadLocal::<DropSignal>::new());
        let dropped = Arc::new(Event::new(false));

        let worker_slot = Arc::clone(&slot);
        let worker_event = Arc::clone(&dropped);
        thread::spawn(move || {
            worker_slot.set(DropSignal(worker_event));
            assert!(worker_slot.is_set());
        })
        .join()
        .unwrap();

        assert!(dropped.is_signaled());
    }

    #[test]
    fn test_thread_tokens_differ() {
        let here = current_thread_token();
        let there = thread::spawn(current_thread_token).join().unwrap();
        assert_ne!(here, 0);
        assert_ne!(here, there);
    }
}
