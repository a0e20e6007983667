//! GPU backend abstraction layer.
//!
//! Each backend implements the [`GpuBackend`] trait. The device picks one at
//! creation through [`DeviceParameters::backend`](crate::DeviceParameters)
//! and talks to it through `Arc<dyn GpuBackend>` only.
//!
//! # Available Backends
//!
//! - [`ExplicitBackend`] (default): retained pipeline objects, command
//!   streams replayed per submission with no state carried over.
//! - [`StateMachineBackend`]: one global set of bound state that every
//!   command mutates in order, as a GL-style driver does.
//!
//! Neither links a native graphics API. Both keep resource memory on the
//! host, which makes them usable in tests and headless tools.

mod error;
mod explicit;
mod memory;
mod state_machine;

use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;
use std::sync::Arc;

pub use error::BackendError;
pub use explicit::ExplicitBackend;
pub use state_machine::StateMachineBackend;

use crate::command::{Command, CommandListId};
use crate::error::PipelineError;
use crate::parameters::DeviceParameters;
use crate::pipeline::PipelineDescriptor;
use crate::types::{
    BufferDescriptor, ShaderDescriptor, ShaderStage, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Opaque name of a backend object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendHandle(pub(crate) u64);

/// Programming model of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    #[default]
    Explicit,
    StateMachine,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::StateMachine => "state-machine",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = crate::parameters::ParseParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(Self::Explicit),
            "state-machine" | "state_machine" | "statemachine" => Ok(Self::StateMachine),
            _ => Err(crate::parameters::ParseParameterError::new("backend", s)),
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Features and limits a backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Compute pipelines and dispatch.
    pub compute: bool,
    /// Geometry and tessellation stages.
    pub geometry_tessellation: bool,
    pub conservative_rasterization: bool,
    pub max_color_attachments: u32,
    pub max_vertex_buffers: u32,
    pub max_texture_dimension: u32,
    /// Largest buffer, and largest texture mip chain, in bytes.
    pub max_buffer_size: u64,
    /// `Rgba32Float` as a render target format.
    pub float32_render_targets: bool,
    /// `Depth32FloatStencil8` textures.
    pub depth32_stencil8: bool,
}

impl DeviceCapabilities {
    /// Capabilities of [`ExplicitBackend`].
    pub const EXPLICIT: Self = Self {
        compute: true,
        geometry_tessellation: false,
        conservative_rasterization: true,
        max_color_attachments: 8,
        max_vertex_buffers: 16,
        max_texture_dimension: 16384,
        max_buffer_size: 1 << 30,
        float32_render_targets: true,
        depth32_stencil8: true,
    };

    /// Capabilities of [`StateMachineBackend`].
    pub const STATE_MACHINE: Self = Self {
        compute: false,
        geometry_tessellation: true,
        conservative_rasterization: false,
        max_color_attachments: 4,
        max_vertex_buffers: 16,
        max_texture_dimension: 8192,
        max_buffer_size: 1 << 28,
        float32_render_targets: false,
        depth32_stencil8: false,
    };

    pub fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Explicit => Self::EXPLICIT,
            BackendKind::StateMachine => Self::STATE_MACHINE,
        }
    }

    /// Checks a buffer descriptor against the size limit.
    pub(crate) fn check_buffer(&self, descriptor: &BufferDescriptor) -> Result<(), BackendError> {
        if descriptor.size > self.max_buffer_size {
            return Err(BackendError::Unsupported(format!(
                "buffer size {} exceeds the limit of {}",
                descriptor.size, self.max_buffer_size
            )));
        }
        Ok(())
    }

    /// Checks a texture descriptor against the limits.
    pub(crate) fn check_texture(&self, descriptor: &TextureDescriptor) -> Result<(), BackendError> {
        let size = descriptor.size;
        let largest = size.width.max(size.height).max(size.depth);
        if largest > self.max_texture_dimension {
            return Err(BackendError::Unsupported(format!(
                "dimension {largest} exceeds the limit of {}",
                self.max_texture_dimension
            )));
        }
        match descriptor.total_size() {
            Some(bytes) if bytes <= self.max_buffer_size => {}
            bytes => {
                return Err(BackendError::Unsupported(format!(
                    "texture of {} bytes exceeds the limit of {}",
                    bytes.map_or_else(|| "more than u64::MAX".to_string(), |b| b.to_string()),
                    self.max_buffer_size
                )));
            }
        }
        if descriptor.format == TextureFormat::Depth32FloatStencil8 && !self.depth32_stencil8 {
            return Err(BackendError::Unsupported("Depth32FloatStencil8 textures".into()));
        }
        if descriptor.usage.contains(TextureUsage::RENDER_TARGET)
            && descriptor.format == TextureFormat::Rgba32Float
            && !self.float32_render_targets
        {
            return Err(BackendError::Unsupported("rendering to Rgba32Float".into()));
        }
        if descriptor.usage.contains(TextureUsage::STORAGE) && !self.compute {
            return Err(BackendError::Unsupported("storage textures without compute".into()));
        }
        Ok(())
    }

    /// Checks the features a pipeline uses. Stage linkage and layouts are
    /// validated before this runs.
    pub(crate) fn check_pipeline(
        &self,
        backend: &'static str,
        descriptor: &PipelineDescriptor,
    ) -> Result<(), PipelineError> {
        let unsupported = |feature: &str| PipelineError::Unsupported {
            backend,
            feature: feature.to_string(),
        };

        let stages = descriptor.stages();
        if descriptor.compute.is_some() && !self.compute {
            return Err(unsupported("compute shaders"));
        }
        let extra_stages = [
            (ShaderStage::Geometry, descriptor.geometry.is_some()),
            (ShaderStage::TessControl, descriptor.tess_control.is_some()),
            (ShaderStage::TessEvaluation, descriptor.tess_evaluation.is_some()),
        ];
        if let Some((stage, _)) = extra_stages.iter().find(|(_, used)| *used)
            && !self.geometry_tessellation
        {
            return Err(unsupported(&format!("{} shaders", stage.name())));
        }
        if descriptor.color_targets.len() > self.max_color_attachments as usize {
            return Err(PipelineError::TooManyColorTargets {
                count: descriptor.color_targets.len(),
                max: self.max_color_attachments,
            });
        }
        if !self.float32_render_targets
            && descriptor
                .color_targets
                .iter()
                .any(|target| target.format == TextureFormat::Rgba32Float)
        {
            return Err(unsupported("Rgba32Float color targets"));
        }
        if !self.depth32_stencil8
            && descriptor
                .depth_stencil
                .is_some_and(|state| state.format == TextureFormat::Depth32FloatStencil8)
        {
            return Err(unsupported("Depth32FloatStencil8 depth targets"));
        }
        if descriptor.rasterizer.conservative && !self.conservative_rasterization {
            return Err(unsupported("conservative rasterization"));
        }
        log::trace!("{backend}: pipeline {:?} uses stages {stages:?}", descriptor.label);
        Ok(())
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::EXPLICIT
    }
}

// ============================================================================
// Execution
// ============================================================================

/// One submission handed to [`GpuBackend::execute`].
#[derive(Debug, Clone, Copy)]
pub struct SubmissionBatch<'a> {
    /// Fence value of the submission.
    pub value: u64,
    pub list: CommandListId,
    pub label: Option<&'a str>,
    pub commands: &'a [Command],
}

/// Work performed by one or more submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExecutionReport {
    pub passes: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub clears: u64,
    pub barriers: u64,
    /// State changes the backend actually applied.
    pub state_changes: u64,
}

impl AddAssign for ExecutionReport {
    fn add_assign(&mut self, other: Self) {
        self.passes += other.passes;
        self.draws += other.draws;
        self.dispatches += other.dispatches;
        self.clears += other.clears;
        self.barriers += other.barriers;
        self.state_changes += other.state_changes;
    }
}

/// GPU backend trait for abstracting different GPU programming models.
pub trait GpuBackend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Get the backend name.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &DeviceCapabilities;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BackendHandle, BackendError>;

    /// Create a texture resource.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<BackendHandle, BackendError>;

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<BackendHandle, BackendError>;

    /// Reject pipelines that use features this backend lacks.
    fn validate_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<(), PipelineError>;

    /// Compile a validated pipeline.
    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<BackendHandle, BackendError>;

    /// Release a backend object.
    fn destroy(&self, handle: BackendHandle) -> Result<(), BackendError>;

    /// Write data to a buffer.
    fn write_buffer(&self, handle: BackendHandle, offset: u64, data: &[u8]) -> Result<(), BackendError>;

    /// Read data from a buffer.
    fn read_buffer(&self, handle: BackendHandle, offset: u64, size: u64) -> Result<Vec<u8>, BackendError>;

    /// Replace one mip level of a texture.
    fn write_texture(&self, handle: BackendHandle, mip: u32, data: &[u8]) -> Result<(), BackendError>;

    fn read_texture(&self, handle: BackendHandle, mip: u32) -> Result<Vec<u8>, BackendError>;

    /// Run a submission to completion.
    ///
    /// Called from the queue in submission order, never concurrently.
    fn execute(&self, batch: &SubmissionBatch<'_>) -> Result<ExecutionReport, BackendError>;

    /// Whether the device has been lost. A lost backend fails every call.
    fn is_lost(&self) -> bool;
}

/// Creates the backend selected by `parameters`.
pub fn create_backend(parameters: &DeviceParameters) -> Arc<dyn GpuBackend> {
    let backend: Arc<dyn GpuBackend> = match parameters.backend {
        BackendKind::Explicit => Arc::new(ExplicitBackend::new(parameters)),
        BackendKind::StateMachine => Arc::new(StateMachineBackend::new(parameters)),
    };
    log::info!(
        "Using {} backend ({} color attachments, compute: {}, geometry/tessellation: {})",
        backend.name(),
        backend.capabilities().max_color_attachments,
        backend.capabilities().compute,
        backend.capabilities().geometry_tessellation
    );
    backend
}

/// Whether every color target blends identically. State-machine drivers
/// hold one global blend state.
pub(crate) fn uniform_blend(descriptor: &PipelineDescriptor) -> bool {
    let mut targets = descriptor.color_targets.iter();
    let Some(first) = targets.next() else {
        return true;
    };
    targets.all(|target| target.blend == first.blend && target.write_mask == first.write_mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BlendState, ColorTargetState, RasterizerState};
    use crate::types::Extent3d;

    #[test]
    fn test_backend_kind_parses() {
        assert_eq!("explicit".parse::<BackendKind>(), Ok(BackendKind::Explicit));
        assert_eq!(
            " State-Machine ".parse::<BackendKind>(),
            Ok(BackendKind::StateMachine)
        );
        assert!("vulkan".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::StateMachine.to_string(), "state-machine");
    }

    #[test]
    fn test_texture_limits() {
        let caps = DeviceCapabilities::STATE_MACHINE;
        let float_target = TextureDescriptor::new_2d(
            4,
            4,
            TextureFormat::Rgba32Float,
            TextureUsage::RENDER_TARGET,
        );
        assert!(matches!(
            caps.check_texture(&float_target),
            Err(BackendError::Unsupported(_))
        ));
        assert!(DeviceCapabilities::EXPLICIT.check_texture(&float_target).is_ok());

        let sampled = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba32Float, TextureUsage::SAMPLED);
        assert!(caps.check_texture(&sampled).is_ok());

        let mut huge = sampled;
        huge.size = Extent3d::new_2d(9000, 1);
        assert!(caps.check_texture(&huge).is_err());
    }

    #[test]
    fn test_size_limits() {
        let caps = DeviceCapabilities::EXPLICIT;
        assert!(caps.check_buffer(&BufferDescriptor::constant(256)).is_ok());
        assert!(matches!(
            caps.check_buffer(&BufferDescriptor::constant(u64::MAX / 2)),
            Err(BackendError::Unsupported(_))
        ));

        // Every axis is within the dimension limit, the volume is not.
        let volume = TextureDescriptor::new_2d(
            16384,
            16384,
            TextureFormat::Rgba32Float,
            TextureUsage::SAMPLED,
        )
        .with_depth(16384);
        assert!(matches!(
            caps.check_texture(&volume),
            Err(BackendError::Unsupported(_))
        ));

        let unbounded = DeviceCapabilities {
            max_texture_dimension: u32::MAX,
            ..caps
        };
        let overflowing = TextureDescriptor {
            size: Extent3d {
                width: u32::MAX,
                height: u32::MAX,
                depth: u32::MAX,
            },
            ..volume
        };
        assert!(unbounded.check_texture(&overflowing).is_err());
    }

    #[test]
    fn test_pipeline_features() {
        let descriptor = PipelineDescriptor {
            rasterizer: RasterizerState::default().with_conservative(true),
            ..PipelineDescriptor::default()
        };
        assert!(DeviceCapabilities::EXPLICIT.check_pipeline("explicit", &descriptor).is_ok());
        assert_eq!(
            DeviceCapabilities::STATE_MACHINE.check_pipeline("state-machine", &descriptor),
            Err(PipelineError::Unsupported {
                backend: "state-machine",
                feature: "conservative rasterization".into()
            })
        );
    }

    #[test]
    fn test_blend_helpers() {
        let mut descriptor = PipelineDescriptor::default().with_color_targets([
            ColorTargetState::new(TextureFormat::Rgba8Unorm).with_blend(BlendState::max()),
            ColorTargetState::new(TextureFormat::Rgba8Unorm).with_blend(BlendState::max()),
        ]);
        assert!(uniform_blend(&descriptor));

        descriptor.color_targets[1].blend = Some(BlendState::alpha_blending());
        assert!(!uniform_blend(&descriptor));
    }

    #[test]
    fn test_report_accumulates() {
        let mut total = ExecutionReport::default();
        total += ExecutionReport {
            draws: 2,
            state_changes: 3,
            ..Default::default()
        };
        total += ExecutionReport {
            draws: 1,
            ..Default::default()
        };
        assert_eq!(total.draws, 3);
        assert_eq!(total.state_changes, 3);
    }
}
