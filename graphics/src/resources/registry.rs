//! Live-resource registry and per-resource tracking.
//!
//! Every resource created through a [`Device`](crate::Device) gets a
//! [`ResourceTracker`] that is shared by all clones of its handle and by the
//! command lists that reference it. The tracker holds two counters:
//!
//! - `references`: unretired command lists (recording, executable or
//!   submitted) that reference the resource. Destruction requires zero.
//! - `in_flight`: submitted, not yet retired command lists. CPU access
//!   (map, update) requires zero.
//!
//! Both counters move under the tracker's state lock together with the
//! lifecycle state, so "destroy vs. record" and "map vs. submit" never race.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tessera_core::sync::{AtomicCounter, Mutex, Timeout};

use crate::backend::BackendHandle;
use crate::device::DeviceId;
use crate::error::GraphicsError;
use crate::scheduler::Fence;
use crate::types::Usage;

/// Resource ids are unique across all devices of the process.
static NEXT_RESOURCE_ID: AtomicCounter = AtomicCounter::new(1);

/// Identifier of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn allocate() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    RenderTarget,
    Shader,
    Pipeline,
}

/// Snapshot entry returned by [`Device::live_resources`](crate::Device::live_resources).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveResource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub label: Option<String>,
    pub references: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifeState {
    Live,
    Mapped,
    Destroyed,
}

#[derive(Debug)]
struct Life {
    state: LifeState,
    /// Fence of the newest submission that referenced the resource.
    last_fence: Option<Fence>,
}

/// Shared tracking state of one resource.
pub(crate) struct ResourceTracker {
    id: ResourceId,
    kind: ResourceKind,
    device: DeviceId,
    label: Option<String>,
    handle: BackendHandle,
    usage: Usage,
    life: Mutex<Life>,
    references: AtomicCounter,
    in_flight: AtomicCounter,
}

impl ResourceTracker {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn handle(&self) -> BackendHandle {
        self.handle
    }

    pub fn references(&self) -> u64 {
        self.references.load()
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load()
    }

    pub fn is_destroyed(&self) -> bool {
        self.life.lock().state == LifeState::Destroyed
    }

    /// Fails if the resource can no longer be used by new work.
    pub fn ensure_usable(&self) -> Result<(), GraphicsError> {
        match self.life.lock().state {
            LifeState::Live => Ok(()),
            LifeState::Mapped => Err(GraphicsError::ResourceMapped { id: self.id }),
            LifeState::Destroyed => Err(GraphicsError::ResourceDestroyed { id: self.id }),
        }
    }

    /// Records a reference from a command list.
    pub fn acquire_reference(&self) -> Result<(), GraphicsError> {
        let life = self.life.lock();
        match life.state {
            LifeState::Live => {
                self.references.increment();
                Ok(())
            }
            LifeState::Mapped => Err(GraphicsError::ResourceMapped { id: self.id }),
            LifeState::Destroyed => Err(GraphicsError::ResourceDestroyed { id: self.id }),
        }
    }

    pub fn release_reference(&self) {
        self.references.decrement();
    }

    /// Marks the resource as used by the submission behind `fence`.
    pub fn begin_flight(&self, fence: &Fence) -> Result<(), GraphicsError> {
        let mut life = self.life.lock();
        match life.state {
            LifeState::Live => {
                self.in_flight.increment();
                life.last_fence = Some(fence.clone());
                Ok(())
            }
            LifeState::Mapped => Err(GraphicsError::ResourceMapped { id: self.id }),
            LifeState::Destroyed => Err(GraphicsError::ResourceDestroyed { id: self.id }),
        }
    }

    pub fn end_flight(&self) {
        self.in_flight.decrement();
    }

    /// Transitions to the destroyed state if nothing references the resource.
    pub fn mark_destroyed(&self) -> Result<(), GraphicsError> {
        let mut life = self.life.lock();
        match life.state {
            LifeState::Destroyed => Err(GraphicsError::ResourceDestroyed { id: self.id }),
            LifeState::Mapped => Err(GraphicsError::ResourceMapped { id: self.id }),
            LifeState::Live => {
                let references = self.references.load();
                if references > 0 {
                    return Err(GraphicsError::ResourceInUse {
                        id: self.id,
                        references,
                    });
                }
                life.state = LifeState::Destroyed;
                life.last_fence = None;
                Ok(())
            }
        }
    }

    /// Enters the mapped state for CPU access.
    ///
    /// While a submission still uses the resource, static resources fail
    /// and dynamic/readback resources wait for the newest referencing fence.
    pub fn begin_cpu_access(&self) -> Result<(), GraphicsError> {
        loop {
            let mut life = self.life.lock();
            match life.state {
                LifeState::Destroyed => {
                    return Err(GraphicsError::ResourceDestroyed { id: self.id });
                }
                LifeState::Mapped => return Err(GraphicsError::ResourceMapped { id: self.id }),
                LifeState::Live => {}
            }

            let in_flight = self.in_flight.load();
            if in_flight == 0 {
                life.state = LifeState::Mapped;
                return Ok(());
            }

            if !self.usage.waits_for_gpu() {
                return Err(GraphicsError::ResourceInUse {
                    id: self.id,
                    references: in_flight,
                });
            }

            let Some(fence) = life.last_fence.clone() else {
                return Err(GraphicsError::BackendFatal(format!(
                    "resource {} is in flight without a fence",
                    self.id
                )));
            };
            drop(life);

            log::trace!(
                "resource {} ({:?}): waiting for fence {} before CPU access",
                self.id,
                self.label,
                fence.value()
            );
            fence.wait(Timeout::Infinite)?;
        }
    }

    pub fn end_cpu_access(&self) {
        let mut life = self.life.lock();
        if life.state == LifeState::Mapped {
            life.state = LifeState::Live;
        }
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("references", &self.references.load())
            .field("in_flight", &self.in_flight.load())
            .finish()
    }
}

/// Registry of a device's live resources.
pub(crate) struct ResourceRegistry {
    device: DeviceId,
    live: Mutex<HashMap<ResourceId, Arc<ResourceTracker>>>,
}

impl ResourceRegistry {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        kind: ResourceKind,
        label: Option<String>,
        handle: BackendHandle,
        usage: Usage,
    ) -> Arc<ResourceTracker> {
        let tracker = Arc::new(ResourceTracker {
            id: ResourceId::allocate(),
            kind,
            device: self.device,
            label,
            handle,
            usage,
            life: Mutex::new(Life {
                state: LifeState::Live,
                last_fence: None,
            }),
            references: AtomicCounter::new(0),
            in_flight: AtomicCounter::new(0),
        });
        self.live
            .lock()
            .insert(tracker.id, Arc::clone(&tracker));
        tracker
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.live.lock().contains_key(&id)
    }

    pub fn unregister(&self, id: ResourceId) -> Option<Arc<ResourceTracker>> {
        self.live.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn snapshot(&self) -> Vec<LiveResource> {
        let mut resources: Vec<_> = self
            .live
            .lock()
            .values()
            .map(|tracker| LiveResource {
                id: tracker.id,
                kind: tracker.kind,
                label: tracker.label.clone(),
                references: tracker.references(),
            })
            .collect();
        resources.sort_by_key(|resource| resource.id);
        resources
    }

    /// Removes every entry, returning the trackers in id order.
    pub fn drain(&self) -> Vec<Arc<ResourceTracker>> {
        let mut drained: Vec<_> = self.live.lock().drain().map(|(_, tracker)| tracker).collect();
        drained.sort_by_key(|tracker| tracker.id);
        drained
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("device", &self.device)
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new(DeviceId::allocate())
    }

    fn register(registry: &ResourceRegistry, usage: Usage) -> Arc<ResourceTracker> {
        registry.register(ResourceKind::Buffer, Some("test".into()), BackendHandle(1), usage)
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = registry();
        let tracker = register(&registry, Usage::Static);
        assert!(registry.contains(tracker.id()));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(tracker.id()).is_some());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_ids_are_unique_across_registries() {
        let a = register(&registry(), Usage::Static);
        let b = register(&registry(), Usage::Static);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_destroy_blocked_by_reference() {
        let registry = registry();
        let tracker = register(&registry, Usage::Static);
        tracker.acquire_reference().unwrap();

        assert_eq!(
            tracker.mark_destroyed(),
            Err(GraphicsError::ResourceInUse {
                id: tracker.id(),
                references: 1
            })
        );

        tracker.release_reference();
        assert!(tracker.mark_destroyed().is_ok());
        assert_eq!(
            tracker.mark_destroyed(),
            Err(GraphicsError::ResourceDestroyed { id: tracker.id() })
        );
    }

    #[test]
    fn test_destroyed_resource_cannot_be_referenced() {
        let registry = registry();
        let tracker = register(&registry, Usage::Static);
        tracker.mark_destroyed().unwrap();
        assert!(matches!(
            tracker.acquire_reference(),
            Err(GraphicsError::ResourceDestroyed { .. })
        ));
    }

    #[test]
    fn test_mapped_resource_rejects_references() {
        let registry = registry();
        let tracker = register(&registry, Usage::Dynamic);
        tracker.begin_cpu_access().unwrap();
        assert!(matches!(
            tracker.acquire_reference(),
            Err(GraphicsError::ResourceMapped { .. })
        ));
        assert!(matches!(
            tracker.begin_cpu_access(),
            Err(GraphicsError::ResourceMapped { .. })
        ));
        tracker.end_cpu_access();
        assert!(tracker.acquire_reference().is_ok());
    }

    #[test]
    fn test_static_in_flight_access_fails() {
        let registry = registry();
        let tracker = register(&registry, Usage::Static);
        let fence = Fence::new(1);
        tracker.begin_flight(&fence).unwrap();
        assert!(matches!(
            tracker.begin_cpu_access(),
            Err(GraphicsError::ResourceInUse { references: 1, .. })
        ));
    }

    #[test]
    fn test_dynamic_in_flight_access_waits() {
        let registry = registry();
        let tracker = register(&registry, Usage::Dynamic);
        let fence = Fence::new(1);
        tracker.begin_flight(&fence).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                tracker.end_flight();
                fence.signal();
            });
            assert!(tracker.begin_cpu_access().is_ok());
        });
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = registry();
        let a = register(&registry, Usage::Static);
        let b = register(&registry, Usage::Static);
        let ids: Vec<_> = registry.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }
}
