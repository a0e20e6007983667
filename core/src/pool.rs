//! Object pooling for allocation reuse.
//!
//! A [`Pool`] is a thread-safe free list. Values given back to the pool are
//! [recycled](Poolable::recycle), which clears their contents but keeps
//! their allocations (for example `Vec` capacity), and handed out again by
//! [`Pool::take`].
//!
//! # Example
//!
//! ```
//! use tessera_core::pool::{Pool, Poolable};
//!
//! #[derive(Debug, Default)]
//! struct Scratch {
//!     data: Vec<u8>,
//! }
//!
//! impl Poolable for Scratch {
//!     fn recycle(&mut self) {
//!         self.data.clear();
//!     }
//! }
//!
//! let pool = Pool::new(4);
//! let mut scratch = pool.take_or_else(Scratch::default);
//! scratch.data.extend_from_slice(&[1, 2, 3]);
//! pool.give(scratch);
//!
//! let reused = pool.take().unwrap();
//! assert!(reused.data.is_empty());
//! assert!(reused.data.capacity() >= 3);
//! ```

use std::fmt;

use crate::sync::Mutex;

/// Types that can be cleared for reuse.
pub trait Poolable {
    /// Reset the value to an empty state, preserving allocated capacity.
    ///
    /// For example, call `Vec::clear()` rather than replacing with a new `Vec`.
    fn recycle(&mut self);
}

/// Bounded, thread-safe free list of recycled values.
///
/// At most `capacity` values are retained. Values given back beyond that are
/// dropped.
pub struct Pool<T: Poolable> {
    free: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Poolable> Pool<T> {
    /// Creates an empty pool that retains at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Takes a recycled value, if any.
    pub fn take(&self) -> Option<T> {
        self.free.lock().pop()
    }

    /// Takes a recycled value or creates a new one with `create`.
    pub fn take_or_else(&self, create: impl FnOnce() -> T) -> T {
        self.take().unwrap_or_else(create)
    }

    /// Recycles `value` and keeps it for reuse.
    ///
    /// Returns `false` if the pool was full and the value was dropped.
    pub fn give(&self, mut value: T) -> bool {
        value.recycle();
        let mut free = self.free.lock();
        if free.len() >= self.capacity {
            return false;
        }
        free.push(value);
        true
    }

    /// Number of values currently available.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every pooled value.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.free.lock());
        drop(drained);
    }
}

impl<T: Poolable> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
