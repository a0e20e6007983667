//! Common graphics types and descriptors.

mod buffer;
mod common;
pub mod constants;
mod shader;
mod texture;
mod vertex;

pub use buffer::{BufferDescriptor, BufferKind, IndexFormat, Usage};
pub use common::{ClearMode, Color, Extent3d, LoadOp, ScissorRect, StoreOp, Viewport};
pub use constants::ConstantWriter;
pub use shader::{
    ShaderCode, ShaderDescriptor, ShaderInterface, ShaderStage, ShaderStages, ShaderVarying,
};
pub use texture::{
    AttachmentRole, RenderTargetDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};
pub use vertex::VertexFormat;
