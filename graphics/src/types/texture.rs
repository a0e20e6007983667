//! Texture types and descriptors.

use bitflags::bitflags;

use super::{Extent3d, Usage};

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,

    // 16-bit formats
    /// 16-bit red channel, float.
    R16Float,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RG channels, float.
    Rg32Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth.
    Depth24Plus,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth, float.
    Depth32Float,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth24Plus
                | Self::Depth24PlusStencil8
                | Self::Depth32Float
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float | Self::Rg8Unorm | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Depth24Plus
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::Depth32FloatStencil8 => 8,
            Self::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be sampled in a shader.
        const SAMPLED = 1 << 0;
        /// Texture can be used as a render pass attachment.
        const RENDER_TARGET = 1 << 1;
        /// Texture contents can be read back by the CPU.
        const READBACK = 1 << 2;
        /// Texture can be written from compute shaders.
        const STORAGE = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::SAMPLED
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
    /// CPU access class for `Texture::update`.
    pub access: Usage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            format,
            usage,
            access: Usage::Static,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the depth or array layer count.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.size.depth = depth;
        self
    }

    /// Set the CPU access class.
    pub fn with_access(mut self, access: Usage) -> Self {
        self.access = access;
        self
    }

    /// Byte size of mip level `level`, or `None` if the level does not exist
    /// or its size does not fit in a `u64`.
    pub fn mip_size(&self, level: u32) -> Option<u64> {
        if level >= self.mip_level_count {
            return None;
        }
        let extent = self.size.mip_level(level);
        u64::from(extent.width)
            .checked_mul(u64::from(extent.height))?
            .checked_mul(u64::from(extent.depth))?
            .checked_mul(u64::from(self.format.block_size()))
    }

    /// Byte size of the whole mip chain, or `None` on overflow.
    pub fn total_size(&self) -> Option<u64> {
        (0..self.mip_level_count).try_fold(0u64, |total, level| {
            total.checked_add(self.mip_size(level)?)
        })
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            mip_level_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::default(),
            access: Usage::Static,
        }
    }
}

// ============================================================================
// Render targets
// ============================================================================

/// How a render target attaches to a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentRole {
    /// Color attachment at the given slot.
    Color(u32),
    /// The depth/stencil attachment.
    DepthStencil,
}

/// Descriptor for creating a render target.
///
/// The underlying texture always carries [`TextureUsage::RENDER_TARGET`].
/// Add [`TextureUsage::SAMPLED`] with [`with_usage`](Self::with_usage) to
/// read the result in a later pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetDescriptor {
    pub texture: TextureDescriptor,
    pub role: AttachmentRole,
}

impl RenderTargetDescriptor {
    /// Color target for attachment slot `slot`.
    pub fn color(width: u32, height: u32, format: TextureFormat, slot: u32) -> Self {
        Self {
            texture: TextureDescriptor::new_2d(width, height, format, TextureUsage::RENDER_TARGET),
            role: AttachmentRole::Color(slot),
        }
    }

    /// Depth/stencil target.
    pub fn depth_stencil(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            texture: TextureDescriptor::new_2d(width, height, format, TextureUsage::RENDER_TARGET),
            role: AttachmentRole::DepthStencil,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.texture.label = Some(label.into());
        self
    }

    /// Add usage flags on top of `RENDER_TARGET`.
    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.texture.usage |= usage;
        self
    }

    pub fn format(&self) -> TextureFormat {
        self.texture.format
    }
}
