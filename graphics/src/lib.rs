//! # Tessera Graphics
//!
//! Portable GPU work submission over backends with different programming
//! models.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Device`] - Resource factory and ordered submission queue
//! - [`CommandList`] - Thread-confined recording of draws, dispatches and
//!   bindings, validated as they are recorded
//! - [`Pipeline`] - Immutable pipeline state, validated once at creation
//! - [`Fence`] - Completion of one submission
//! - [`ImmediateContext`] - State-machine style drawing on top of the above
//! - Two backends: [`ExplicitBackend`] (retained pipelines, recorded command
//!   buffers) and [`StateMachineBackend`] (global bound state)
//!
//! ## Example
//!
//! ```
//! use std::thread;
//! use tessera_graphics::*;
//!
//! let device = Device::new(DeviceParameters::default()).unwrap();
//!
//! // Record on several threads, submit from each.
//! let fences: Vec<Fence> = thread::scope(|scope| {
//!     let workers: Vec<_> = (0..4)
//!         .map(|_| {
//!             scope.spawn(|| {
//!                 let mut list = device.command_list();
//!                 list.begin().unwrap();
//!                 list.set_viewport(Viewport::from_dimensions(64, 64)).unwrap();
//!                 list.end().unwrap();
//!                 device.submit(list).unwrap().fence().clone()
//!             })
//!         })
//!         .collect();
//!     workers.into_iter().map(|w| w.join().unwrap()).collect()
//! });
//!
//! assert_eq!(device.wait_idle(Timeout::Infinite), Ok(WaitResult::Signaled));
//! assert!(fences.iter().all(Fence::is_signaled));
//! device.shutdown().unwrap();
//! ```

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
pub mod immediate;
pub mod parameters;
pub mod pipeline;
pub mod resources;
pub mod scheduler;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    BackendError, BackendHandle, BackendKind, DeviceCapabilities, ExecutionReport,
    ExplicitBackend, GpuBackend, StateMachineBackend, SubmissionBatch,
};
pub use command::{
    Access, BarrierResource, ColorAttachment, Command, CommandList, CommandListId,
    CommandListPool, CommandListState, DepthStencilAttachment, RenderPassDescriptor,
};
pub use device::{Device, DeviceId};
pub use error::{
    BindingSlot, GraphicsError, PipelineError, RejectedDescriptor, ShutdownError, SubmitError,
};
pub use immediate::{FrameStatistics, ImmediateContext};
pub use parameters::{CompletionMode, DeviceParameters, ParseParameterError};
pub use pipeline::{
    BindingLayout, BindingLayoutEntry, BindingType, BlendComponent, BlendFactor, BlendOperation,
    BlendState, ColorTargetState, ColorWrites, CompareFunction, CullMode, DepthStencilState,
    FillMode, FrontFace, Pipeline, PipelineDescriptor, PipelineKind, PrimitiveTopology,
    RasterizerState, StencilFaceState, StencilOperation, VertexAttribute, VertexBufferLayout,
    VertexLayout, VertexStepMode,
};
pub use resources::{
    Buffer, BufferReadGuard, BufferWriteGuard, LiveResource, RenderTarget, ResourceId,
    ResourceKind, Shader, Texture,
};
pub use scheduler::{Fence, FenceStatus, QueueStatistics, Submission};
pub use tessera_core::sync::{Timeout, WaitResult};
pub use types::{
    AttachmentRole, BufferDescriptor, BufferKind, ClearMode, Color, ConstantWriter, Extent3d,
    IndexFormat, LoadOp, RenderTargetDescriptor, ScissorRect, ShaderCode, ShaderDescriptor,
    ShaderInterface, ShaderStage, ShaderStages, ShaderVarying, StoreOp, TextureDescriptor,
    TextureFormat, TextureUsage, Usage, VertexFormat, Viewport,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_devices_are_independent() {
        let explicit = Device::new(DeviceParameters::default()).unwrap();
        let legacy =
            Device::new(DeviceParameters::default().with_backend(BackendKind::StateMachine))
                .unwrap();
        assert_eq!(explicit.backend_name(), "explicit");
        assert_eq!(legacy.backend_name(), "state-machine");
        assert_ne!(explicit.id(), legacy.id());
    }
}
