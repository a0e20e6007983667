//! GPU resources.
//!
//! This module contains the resource types created by [`Device`]:
//! - [`Buffer`]: vertex, index, constant or storage memory
//! - [`Texture`]: sampled or storage image
//! - [`RenderTarget`]: texture with attachment semantics
//! - [`Shader`]: program for one stage
//!
//! Handles are cheap to clone and can be shared across threads. Their
//! lifetime is managed by the device: `Device::destroy_*` unregisters a
//! resource, and the [`registry`] refuses while command lists still
//! reference it.
//!
//! [`Device`]: crate::Device

mod buffer;
pub(crate) mod registry;
mod shader;
mod texture;

pub use buffer::{Buffer, BufferReadGuard, BufferWriteGuard};
pub use registry::{LiveResource, ResourceId, ResourceKind};
pub(crate) use registry::{ResourceRegistry, ResourceTracker};
pub use shader::Shader;
pub use texture::{RenderTarget, Texture};
