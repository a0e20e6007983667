//! # Tessera Core
//!
//! Threading building blocks shared by the Tessera crates:
//!
//! - [`sync`]: mutex, atomic counter, semaphore, event and thread-local
//!   storage. Every other crate coordinates threads through these types only.
//! - [`pool`]: free lists that keep allocations alive between uses.

pub mod pool;
pub mod sync;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
