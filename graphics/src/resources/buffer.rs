//! GPU buffer resource.

use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytemuck::Pod;

use super::{ResourceId, ResourceTracker};
use crate::backend::{BackendHandle, GpuBackend};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferKind, Usage};

struct BufferInner {
    tracker: Arc<ResourceTracker>,
    descriptor: BufferDescriptor,
    backend: Arc<dyn GpuBackend>,
}

/// A GPU buffer resource.
///
/// Buffers are created by [`Device::create_buffer`](crate::Device::create_buffer)
/// and destroyed by [`Device::destroy_buffer`](crate::Device::destroy_buffer).
/// The handle is cheap to clone. All clones refer to the same buffer.
///
/// CPU access goes through scoped guards. Dropping the guard unmaps the
/// buffer. While a guard is alive the buffer cannot be recorded into command
/// lists or submitted.
///
/// # Example
///
/// ```
/// use tessera_graphics::{BufferDescriptor, Device, DeviceParameters};
///
/// let device = Device::new(DeviceParameters::default()).unwrap();
/// let buffer = device.create_buffer(&BufferDescriptor::vertex(3, 8)).unwrap();
/// {
///     let mut vertices = buffer.lock::<[f32; 2]>(0, 3).unwrap();
///     vertices[1] = [0.5, 1.0];
/// }
/// assert_eq!(&buffer.map_read().unwrap()[8..12], bytemuck::bytes_of(&0.5f32));
/// device.destroy_buffer(&buffer).unwrap();
/// ```
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Create a new buffer (called by Device).
    pub(crate) fn new(
        tracker: Arc<ResourceTracker>,
        descriptor: BufferDescriptor,
        backend: Arc<dyn GpuBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                tracker,
                descriptor,
                backend,
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.inner.tracker.id()
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.inner.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.descriptor.size
    }

    pub fn kind(&self) -> BufferKind {
        self.inner.descriptor.kind
    }

    pub fn usage(&self) -> Usage {
        self.inner.descriptor.usage
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.inner.descriptor.label.as_deref()
    }

    /// Number of vertices or indices the buffer holds.
    pub fn element_count(&self) -> Option<u64> {
        self.inner.descriptor.element_count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.tracker.is_destroyed()
    }

    pub(crate) fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.inner.tracker
    }

    pub(crate) fn handle(&self) -> BackendHandle {
        self.inner.tracker.handle()
    }

    /// Map the whole buffer for writing. The current contents are visible
    /// through the guard and written back when it drops.
    pub fn map_write(&self) -> Result<BufferWriteGuard<'_, u8>, GraphicsError> {
        self.lock::<u8>(0, self.byte_len()?)
    }

    /// Map the whole buffer for reading.
    pub fn map_read(&self) -> Result<BufferReadGuard<'_, u8>, GraphicsError> {
        self.read::<u8>(0, self.byte_len()?)
    }

    /// Lock `count` elements of type `T` starting at element `start` for
    /// writing.
    pub fn lock<T: Pod>(
        &self,
        start: usize,
        count: usize,
    ) -> Result<BufferWriteGuard<'_, T>, GraphicsError> {
        let (offset, data) = self.begin_access::<T>(start, count)?;
        Ok(BufferWriteGuard {
            buffer: self,
            offset,
            data,
            flushed: false,
        })
    }

    /// Lock `count` elements of type `T` starting at element `start` for
    /// reading.
    pub fn read<T: Pod>(
        &self,
        start: usize,
        count: usize,
    ) -> Result<BufferReadGuard<'_, T>, GraphicsError> {
        let (_, data) = self.begin_access::<T>(start, count)?;
        Ok(BufferReadGuard {
            buffer: self,
            data,
        })
    }

    /// Overwrite the bytes at `offset` without mapping the whole buffer.
    ///
    /// Follows the same in-flight rules as mapping.
    pub fn update(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        self.check_range(offset, data.len() as u64)?;
        let tracker = &self.inner.tracker;
        tracker.begin_cpu_access()?;
        let result = self.inner.backend.write_buffer(self.handle(), offset, data);
        tracker.end_cpu_access();
        result.map_err(GraphicsError::from)
    }

    fn byte_len(&self) -> Result<usize, GraphicsError> {
        usize::try_from(self.size()).map_err(|_| GraphicsError::OutOfBounds {
            id: self.id(),
            start: 0,
            end: self.size(),
            size: self.size(),
        })
    }

    fn check_range(&self, start: u64, len: u64) -> Result<(), GraphicsError> {
        let end = start.checked_add(len);
        match end {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(GraphicsError::OutOfBounds {
                id: self.id(),
                start,
                end: end.unwrap_or(u64::MAX),
                size: self.size(),
            }),
        }
    }

    /// Enters CPU access and copies the requested range out of device memory.
    fn begin_access<T: Pod>(
        &self,
        start: usize,
        count: usize,
    ) -> Result<(u64, Vec<T>), GraphicsError> {
        let element = mem::size_of::<T>();
        if element == 0 {
            return Err(GraphicsError::missing("lock", "an element type with a non-zero size"));
        }
        let offset = (start as u64).saturating_mul(element as u64);
        let len = (count as u64).saturating_mul(element as u64);
        self.check_range(offset, len)?;

        let tracker = &self.inner.tracker;
        tracker.begin_cpu_access()?;

        let bytes = match self.inner.backend.read_buffer(self.handle(), offset, len) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracker.end_cpu_access();
                return Err(err.into());
            }
        };
        let mut data = vec![T::zeroed(); count];
        bytemuck::cast_slice_mut::<T, u8>(&mut data).copy_from_slice(&bytes);

        log::trace!(
            "Buffer {} ({:?}): mapped {} bytes at offset {}",
            self.id(),
            self.label(),
            len,
            offset
        );
        Ok((offset, data))
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id())
            .field("size", &self.inner.descriptor.size)
            .field("kind", &self.inner.descriptor.kind)
            .field("usage", &self.inner.descriptor.usage)
            .field("label", &self.inner.descriptor.label)
            .finish()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

// ============================================================================
// Mapping guards
// ============================================================================

/// Writable view of a mapped buffer range. Dropping it writes the contents
/// back and unmaps the buffer.
pub struct BufferWriteGuard<'a, T: Pod> {
    buffer: &'a Buffer,
    offset: u64,
    data: Vec<T>,
    flushed: bool,
}

impl<T: Pod> BufferWriteGuard<'_, T> {
    /// Unmap explicitly, reporting a failed write-back.
    pub fn unmap(mut self) -> Result<(), GraphicsError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<(), GraphicsError> {
        self.flushed = true;
        let bytes: &[u8] = bytemuck::cast_slice(&self.data);
        self.buffer
            .inner
            .backend
            .write_buffer(self.buffer.handle(), self.offset, bytes)
            .map_err(GraphicsError::from)
    }
}

impl<T: Pod> Deref for BufferWriteGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T: Pod> DerefMut for BufferWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Pod> Drop for BufferWriteGuard<'_, T> {
    fn drop(&mut self) {
        if !self.flushed
            && let Err(err) = self.flush()
        {
            log::error!("Buffer {}: write-back on unmap failed: {err}", self.buffer.id());
        }
        self.buffer.inner.tracker.end_cpu_access();
    }
}

/// Read-only view of a mapped buffer range. Dropping it unmaps the buffer.
pub struct BufferReadGuard<'a, T: Pod> {
    buffer: &'a Buffer,
    data: Vec<T>,
}

impl<T: Pod> Deref for BufferReadGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T: Pod> Drop for BufferReadGuard<'_, T> {
    fn drop(&mut self) {
        self.buffer.inner.tracker.end_cpu_access();
    }
}

impl<T: Pod + fmt::Debug> fmt::Debug for BufferReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferReadGuard")
            .field("buffer", &self.buffer.id())
            .field("data", &self.data)
            .finish()
    }
}
