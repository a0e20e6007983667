//! Graphics error types.

use std::fmt;

use thiserror::Error;

use crate::command::{CommandList, CommandListState};
use crate::device::Device;
use crate::resources::ResourceId;
use crate::types::{
    BufferDescriptor, RenderTargetDescriptor, ShaderDescriptor, ShaderStage, TextureDescriptor,
    TextureFormat, VertexFormat,
};

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphicsError {
    /// The backend cannot create a resource from this descriptor.
    #[error("cannot create {descriptor}: {reason}")]
    ResourceCreation {
        descriptor: Box<RejectedDescriptor>,
        reason: String,
    },
    /// The resource is still referenced by unretired command lists.
    #[error("resource {id} is still referenced {references} time(s)")]
    ResourceInUse { id: ResourceId, references: u64 },
    /// The resource was destroyed.
    #[error("resource {id} has been destroyed")]
    ResourceDestroyed { id: ResourceId },
    /// The resource is mapped for CPU access.
    #[error("resource {id} is mapped")]
    ResourceMapped { id: ResourceId },
    /// A CPU access touched bytes outside the resource.
    #[error("range {start}..{end} is outside resource {id} of {size} bytes")]
    OutOfBounds {
        id: ResourceId,
        start: u64,
        end: u64,
        size: u64,
    },
    /// Pipeline validation failed.
    #[error("pipeline creation failed: {0}")]
    PipelineCreation(#[from] PipelineError),
    /// The operation is not legal in the command list's current state.
    #[error("`{operation}` is not allowed while the command list is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: CommandListState,
    },
    /// A precondition of the operation is not met.
    #[error("`{operation}` requires {requirement}")]
    MissingState {
        operation: &'static str,
        requirement: String,
    },
    /// A binding does not match what the pipeline or pass declares.
    #[error("binding mismatch at {slot}: {reason}")]
    BindingMismatch { slot: BindingSlot, reason: String },
    /// The device was shut down with work still in flight.
    #[error("device shutdown with {outstanding} unretired submission(s)")]
    ShutdownWhileBusy { outstanding: u64 },
    /// The backend failed unrecoverably. The device must be recreated.
    #[error("fatal backend error: {0}")]
    BackendFatal(String),
}

impl GraphicsError {
    pub(crate) fn missing(operation: &'static str, requirement: impl Into<String>) -> Self {
        Self::MissingState {
            operation,
            requirement: requirement.into(),
        }
    }

    pub(crate) fn mismatch(slot: BindingSlot, reason: impl Into<String>) -> Self {
        Self::BindingMismatch {
            slot,
            reason: reason.into(),
        }
    }

    pub(crate) fn rejected(descriptor: RejectedDescriptor, reason: impl Into<String>) -> Self {
        Self::ResourceCreation {
            descriptor: Box::new(descriptor),
            reason: reason.into(),
        }
    }
}

/// Descriptor carried by [`GraphicsError::ResourceCreation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectedDescriptor {
    Buffer(BufferDescriptor),
    Texture(TextureDescriptor),
    RenderTarget(RenderTargetDescriptor),
    Shader(ShaderDescriptor),
}

impl fmt::Display for RejectedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn name(label: &Option<String>) -> &str {
            label.as_deref().unwrap_or("<unnamed>")
        }

        match self {
            Self::Buffer(d) => write!(f, "{} `{}` ({} bytes)", d.kind, name(&d.label), d.size),
            Self::Texture(d) => write!(
                f,
                "texture `{}` ({}x{}x{} {:?})",
                name(&d.label),
                d.size.width,
                d.size.height,
                d.size.depth,
                d.format
            ),
            Self::RenderTarget(d) => write!(
                f,
                "render target `{}` ({}x{} {:?}, {:?})",
                name(&d.texture.label),
                d.texture.size.width,
                d.texture.size.height,
                d.texture.format,
                d.role
            ),
            Self::Shader(d) => write!(f, "{} shader `{}`", d.stage.name(), name(&d.label)),
        }
    }
}

/// Slot named by [`GraphicsError::BindingMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    /// A constant/storage buffer or texture slot of the binding layout.
    Resource(u32),
    VertexBuffer(u32),
    IndexBuffer,
    ColorAttachment(u32),
    DepthStencil,
    Pipeline,
    /// The resource of a barrier.
    Barrier,
}

impl fmt::Display for BindingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(slot) => write!(f, "resource slot {slot}"),
            Self::VertexBuffer(slot) => write!(f, "vertex buffer slot {slot}"),
            Self::IndexBuffer => f.write_str("index buffer"),
            Self::ColorAttachment(slot) => write!(f, "color attachment {slot}"),
            Self::DepthStencil => f.write_str("depth/stencil attachment"),
            Self::Pipeline => f.write_str("pipeline"),
            Self::Barrier => f.write_str("barrier"),
        }
    }
}

/// Reasons a pipeline descriptor is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("pipeline has no shader stages")]
    NoStages,
    #[error("graphics pipeline has no vertex stage")]
    MissingVertexStage,
    #[error("compute stage cannot be combined with graphics stages")]
    MixedStages,
    #[error("shader in the {slot:?} slot is a {declared:?} shader")]
    StageMismatch {
        slot: ShaderStage,
        declared: ShaderStage,
    },
    #[error("tessellation control and evaluation stages must be used together")]
    IncompleteTessellation,
    #[error("shader {0} has been destroyed")]
    ShaderDestroyed(ResourceId),
    #[error("{stage:?} stage expects {expected} input(s) but the previous stage provides {provided}")]
    InputCountMismatch {
        stage: ShaderStage,
        expected: usize,
        provided: usize,
    },
    #[error("{stage:?} input at location {location} is not provided by the previous stage")]
    UnlinkedInput { stage: ShaderStage, location: u32 },
    #[error("{stage:?} input at location {location} expects {expected:?} but receives {provided:?}")]
    FormatMismatch {
        stage: ShaderStage,
        location: u32,
        expected: VertexFormat,
        provided: VertexFormat,
    },
    #[error("binding slot {0} is declared more than once")]
    DuplicateBindingSlot(u32),
    #[error("binding slot {slot} is not visible to any stage of the pipeline")]
    InvalidVisibility { slot: u32 },
    #[error("vertex location {0} is declared more than once")]
    DuplicateLocation(u32),
    #[error("vertex attribute at location {0} runs past the last location")]
    LocationOutOfRange(u32),
    #[error("vertex attribute at location {location} reads buffer {buffer_index} of {buffer_count}")]
    BufferIndexOutOfRange {
        location: u32,
        buffer_index: u32,
        buffer_count: usize,
    },
    #[error("vertex attribute at location {location} ends at byte {end}, past stride {stride}")]
    AttributeOutOfStride { location: u32, end: u32, stride: u32 },
    #[error("vertex attributes at locations {first} and {second} overlap")]
    OverlappingAttributes { first: u32, second: u32 },
    #[error("vertex buffer {0} has zero stride")]
    ZeroStride(u32),
    #[error("{count} vertex buffers exceed the limit of {max}")]
    TooManyVertexBuffers { count: usize, max: u32 },
    #[error("{count} color targets exceed the limit of {max}")]
    TooManyColorTargets { count: usize, max: u32 },
    #[error("{0:?} is not a color format")]
    InvalidColorFormat(TextureFormat),
    #[error("{0:?} is not a depth format")]
    InvalidDepthFormat(TextureFormat),
    #[error("stencil testing needs a stencil format, got {0:?}")]
    MissingStencil(TextureFormat),
    #[error("not supported by the {backend} backend: {feature}")]
    Unsupported {
        backend: &'static str,
        feature: String,
    },
}

/// A rejected [`Device::submit`]. The command list is handed back.
#[derive(Debug, Error)]
#[error("submission rejected: {error}")]
pub struct SubmitError {
    #[source]
    pub error: GraphicsError,
    pub list: CommandList,
}

impl SubmitError {
    pub fn into_parts(self) -> (GraphicsError, CommandList) {
        (self.error, self.list)
    }
}

/// A rejected [`Device::shutdown`]. The device is handed back so the caller
/// can wait for outstanding work and try again.
#[derive(Debug, Error)]
#[error("shutdown rejected: {error}")]
pub struct ShutdownError {
    #[source]
    pub error: GraphicsError,
    pub device: Device,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferKind;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::ShutdownWhileBusy { outstanding: 2 };
        assert_eq!(err.to_string(), "device shutdown with 2 unretired submission(s)");

        let err = GraphicsError::BackendFatal("device lost".to_string());
        assert_eq!(err.to_string(), "fatal backend error: device lost");
    }

    #[test]
    fn test_rejected_descriptor_display() {
        let err = GraphicsError::rejected(
            RejectedDescriptor::Buffer(BufferDescriptor::new(0, BufferKind::Constant).with_label("ubo")),
            "size is zero",
        );
        assert_eq!(err.to_string(), "cannot create constant buffer `ubo` (0 bytes): size is zero");
    }

    #[test]
    fn test_pipeline_error_converts() {
        let err: GraphicsError = PipelineError::MissingVertexStage.into();
        assert!(matches!(err, GraphicsError::PipelineCreation(PipelineError::MissingVertexStage)));
    }

    #[test]
    fn test_binding_slot_display() {
        let err = GraphicsError::mismatch(BindingSlot::Resource(3), "slot not declared");
        assert_eq!(err.to_string(), "binding mismatch at resource slot 3: slot not declared");
    }
}
