//! Render pass attachments.

use crate::resources::RenderTarget;
use crate::types::{Color, LoadOp, StoreOp, TextureFormat};

/// A color attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub target: RenderTarget,
    pub load: LoadOp<Color>,
    pub store: StoreOp,
}

impl ColorAttachment {
    /// Attach `target`, keeping its contents.
    pub fn new(target: &RenderTarget) -> Self {
        Self {
            target: target.clone(),
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    /// Attach `target`, clearing it to `color` first.
    pub fn cleared(target: &RenderTarget, color: Color) -> Self {
        Self {
            load: LoadOp::Clear(color),
            ..Self::new(target)
        }
    }

    pub fn with_store(mut self, store: StoreOp) -> Self {
        self.store = store;
        self
    }
}

/// The depth/stencil attachment of a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub target: RenderTarget,
    pub depth_load: LoadOp<f32>,
    pub stencil_load: LoadOp<u32>,
    pub store: StoreOp,
}

impl DepthStencilAttachment {
    pub fn new(target: &RenderTarget) -> Self {
        Self {
            target: target.clone(),
            depth_load: LoadOp::Load,
            stencil_load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    /// Attach `target`, clearing depth to `depth` and stencil to `stencil`.
    pub fn cleared(target: &RenderTarget, depth: f32, stencil: u32) -> Self {
        Self {
            depth_load: LoadOp::Clear(depth),
            stencil_load: LoadOp::Clear(stencil),
            ..Self::new(target)
        }
    }
}

/// Describes the attachments of a render pass.
///
/// A pass with no attachments renders to the device's default framebuffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil: Option<DepthStencilAttachment>,
}

impl RenderPassDescriptor {
    /// Pass targeting the default framebuffer.
    pub fn default_framebuffer() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_stencil(mut self, attachment: DepthStencilAttachment) -> Self {
        self.depth_stencil = Some(attachment);
        self
    }

    pub fn is_default_framebuffer(&self) -> bool {
        self.color_attachments.is_empty() && self.depth_stencil.is_none()
    }

    /// All attached render targets, color first.
    pub fn targets(&self) -> impl Iterator<Item = &RenderTarget> {
        self.color_attachments
            .iter()
            .map(|attachment| &attachment.target)
            .chain(self.depth_stencil.iter().map(|attachment| &attachment.target))
    }

    pub(crate) fn color_formats(&self) -> Vec<TextureFormat> {
        self.color_attachments
            .iter()
            .map(|attachment| attachment.target.format())
            .collect()
    }
}
