//! Free list of command lists.

use tessera_core::pool::Pool;

use super::CommandList;
use crate::device::DeviceId;

/// Default number of retired lists kept for reuse.
const DEFAULT_CAPACITY: usize = 32;

/// Keeps retired command lists so their allocations are reused.
#[derive(Debug)]
pub struct CommandListPool {
    device: DeviceId,
    pool: Pool<CommandList>,
}

impl CommandListPool {
    pub(crate) fn new(device: DeviceId) -> Self {
        Self::with_capacity(device, DEFAULT_CAPACITY)
    }

    pub(crate) fn with_capacity(device: DeviceId, capacity: usize) -> Self {
        Self {
            device,
            pool: Pool::new(capacity),
        }
    }

    /// A list in the Initial state, reused when one is available.
    pub fn acquire(&self) -> CommandList {
        self.pool
            .take_or_else(|| CommandList::new(self.device))
    }

    /// Recycle `list`. Returns `false` if it belongs to another device or the
    /// pool is full, in which case the list is dropped.
    pub fn release(&self, list: CommandList) -> bool {
        if list.device() != self.device {
            return false;
        }
        self.pool.give(list)
    }

    /// Number of lists ready for reuse.
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    pub fn clear(&self) {
        self.pool.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandListState;

    #[test]
    fn test_release_recycles_list() {
        let pool = CommandListPool::new(DeviceId::allocate());
        let mut list = pool.acquire();
        let id = list.id();
        list.begin().unwrap();
        list.set_stencil_reference(1).unwrap();
        assert!(pool.release(list));
        assert_eq!(pool.available(), 1);

        let reused = pool.acquire();
        assert_eq!(reused.state(), CommandListState::Initial);
        assert!(reused.is_empty());
        assert_ne!(reused.id(), id);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_foreign_list_is_rejected() {
        let pool = CommandListPool::new(DeviceId::allocate());
        let other = CommandListPool::new(DeviceId::allocate());
        assert!(!pool.release(other.acquire()));
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_capacity_bounds_pool() {
        let pool = CommandListPool::with_capacity(DeviceId::allocate(), 1);
        assert!(pool.release(pool.acquire()));
        assert!(!pool.release(CommandList::new(pool.device)));
    }
}
