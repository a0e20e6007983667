//! GPU texture and render target resources.

use std::fmt;
use std::sync::Arc;

use super::{ResourceId, ResourceTracker};
use crate::backend::{BackendHandle, GpuBackend};
use crate::error::GraphicsError;
use crate::types::{AttachmentRole, Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

struct TextureInner {
    tracker: Arc<ResourceTracker>,
    descriptor: TextureDescriptor,
    role: Option<AttachmentRole>,
    backend: Arc<dyn GpuBackend>,
}

/// A GPU texture resource.
///
/// Textures are created by [`Device::create_texture`](crate::Device::create_texture).
/// Format and usage are fixed at creation. The handle is cheap to clone.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl Texture {
    pub(crate) fn new(
        tracker: Arc<ResourceTracker>,
        descriptor: TextureDescriptor,
        role: Option<AttachmentRole>,
        backend: Arc<dyn GpuBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                tracker,
                descriptor,
                role,
                backend,
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.inner.tracker.id()
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.inner.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.inner.descriptor.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.inner.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.inner.descriptor.size.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.inner.descriptor.format
    }

    pub fn usage(&self) -> TextureUsage {
        self.inner.descriptor.usage
    }

    pub fn mip_level_count(&self) -> u32 {
        self.inner.descriptor.mip_level_count
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.inner.descriptor.label.as_deref()
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

    /// Replace the contents of mip level `mip`.
    ///
    /// `data` must cover the whole level. Follows the same in-flight rules as
    /// buffer mapping.
    pub fn update(&self, mip: u32, data: &[u8]) -> Result<(), GraphicsError> {
        self.check_mip(mip, data.len() as u64)?;
        let tracker = &self.inner.tracker;
        tracker.begin_cpu_access()?;
        let result = self.inner.backend.write_texture(self.handle(), mip, data);
        tracker.end_cpu_access();
        log::trace!("Texture {} ({:?}): updated mip {mip}", self.id(), self.label());
        result.map_err(GraphicsError::from)
    }

    /// Copy mip level `mip` back to the CPU.
    ///
    /// Requires [`TextureUsage::READBACK`].
    pub fn read(&self, mip: u32) -> Result<Vec<u8>, GraphicsError> {
        if !self.usage().contains(TextureUsage::READBACK) {
            return Err(GraphicsError::missing("read", "a texture created with READBACK usage"));
        }
        let expected = self.mip_len(mip)?;
        let tracker = &self.inner.tracker;
        tracker.begin_cpu_access()?;
        let result = self.inner.backend.read_texture(self.handle(), mip);
        tracker.end_cpu_access();
        let bytes = result?;
        debug_assert_eq!(bytes.len() as u64, expected);
        Ok(bytes)
    }

    fn mip_len(&self, mip: u32) -> Result<u64, GraphicsError> {
        self.inner
            .descriptor
            .mip_size(mip)
            .ok_or_else(|| GraphicsError::OutOfBounds {
                id: self.id(),
                start: u64::from(mip),
                end: u64::from(mip) + 1,
                size: u64::from(self.mip_level_count()),
            })
    }

    fn check_mip(&self, mip: u32, len: u64) -> Result<(), GraphicsError> {
        let expected = self.mip_len(mip)?;
        if len != expected {
            return Err(GraphicsError::OutOfBounds {
                id: self.id(),
                start: 0,
                end: len,
                size: expected,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id())
            .field("size", &self.inner.descriptor.size)
            .field("format", &self.inner.descriptor.format)
            .field("usage", &self.inner.descriptor.usage)
            .field("label", &self.inner.descriptor.label)
            .finish()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// Render Target
// ============================================================================

/// A texture that can be attached to a render pass.
///
/// Created by [`Device::create_render_target`](crate::Device::create_render_target).
/// The [`AttachmentRole`] says which attachment it is meant for. A render
/// target created with [`TextureUsage::SAMPLED`] can be bound as a texture
/// through [`texture`](Self::texture).
#[derive(Clone, PartialEq)]
pub struct RenderTarget {
    texture: Texture,
}

impl RenderTarget {
    pub(crate) fn new(texture: Texture) -> Self {
        Self { texture }
    }

    pub fn id(&self) -> ResourceId {
        self.texture.id()
    }

    /// The underlying texture.
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn role(&self) -> AttachmentRole {
        self.texture
            .inner
            .role
            .unwrap_or(AttachmentRole::Color(0))
    }

    pub fn format(&self) -> TextureFormat {
        self.texture.format()
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn label(&self) -> Option<&str> {
        self.texture.label()
    }

    pub fn is_destroyed(&self) -> bool {
        self.texture.is_destroyed()
    }

    pub(crate) fn tracker(&self) -> &Arc<ResourceTracker> {
        self.texture.tracker()
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("id", &self.id())
            .field("role", &self.role())
            .field("format", &self.format())
            .field("label", &self.label())
            .finish()
    }
}

// Ensure Texture and RenderTarget are Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);
static_assertions::assert_impl_all!(RenderTarget: Send, Sync);
