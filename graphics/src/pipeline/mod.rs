//! Pipeline state objects.
//!
//! A [`Pipeline`] is an immutable aggregate of shaders, vertex input layout,
//! binding layout and fixed-function state. Everything is validated once in
//! [`Device::create_pipeline`](crate::Device::create_pipeline):
//!
//! 1. Stage set: a graphics pipeline needs a vertex stage, a compute pipeline
//!    takes exactly one compute stage. Every shader must sit in the slot of
//!    its declared stage.
//! 2. Referenced shaders must be live.
//! 3. Vertex layout and binding layout are well formed.
//! 4. Stage linkage: each stage's inputs are provided by the previous stage
//!    (the vertex layout for the vertex stage) with matching formats.
//! 5. Color and depth targets use formats fit for their role.
//! 6. The backend supports every feature the descriptor uses.
//!
//! ```text
//! vertex layout ──► vertex ──► [tess control ──► tess eval] ──► [geometry] ──► fragment
//! ```

mod layout;
mod state;

use std::fmt;
use std::sync::Arc;

pub use layout::{
    BindingLayout, BindingLayoutEntry, BindingType, VertexAttribute, VertexBufferLayout,
    VertexLayout, VertexStepMode,
};
pub use state::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, ColorTargetState, ColorWrites,
    CompareFunction, CullMode, DepthStencilState, FillMode, FrontFace, PrimitiveTopology,
    RasterizerState, StencilFaceState, StencilOperation,
};

use crate::backend::{BackendHandle, DeviceCapabilities};
use crate::error::PipelineError;
use crate::resources::{ResourceId, ResourceTracker, Shader};
use crate::types::{ShaderStage, ShaderStages, ShaderVarying, TextureFormat};

/// Whether a pipeline draws or dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// Descriptor for creating a pipeline.
///
/// # Example
///
/// ```
/// use tessera_graphics::*;
///
/// let device = Device::new(DeviceParameters::default()).unwrap();
/// let vs = device
///     .create_shader(
///         &ShaderDescriptor::new(ShaderStage::Vertex, ShaderCode::Source("vs".into()))
///             .with_input(0, VertexFormat::Float3)
///             .with_output(0, VertexFormat::Float4),
///     )
///     .unwrap();
/// let fs = device
///     .create_shader(
///         &ShaderDescriptor::new(ShaderStage::Fragment, ShaderCode::Source("fs".into()))
///             .with_input(0, VertexFormat::Float4),
///     )
///     .unwrap();
///
/// let descriptor = PipelineDescriptor::graphics(&vs, &fs)
///     .with_vertex_layout(VertexLayout::packed(&[VertexFormat::Float3]))
///     .with_binding(BindingLayoutEntry::constant_buffer(0, ShaderStages::VERTEX));
/// let pipeline = device.create_pipeline(&descriptor).unwrap();
/// assert_eq!(pipeline.kind(), PipelineKind::Graphics);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PipelineDescriptor {
    pub label: Option<String>,
    pub vertex: Option<Shader>,
    pub tess_control: Option<Shader>,
    pub tess_evaluation: Option<Shader>,
    pub geometry: Option<Shader>,
    pub fragment: Option<Shader>,
    pub compute: Option<Shader>,
    pub vertex_layout: VertexLayout,
    pub bindings: BindingLayout,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
}

impl PipelineDescriptor {
    /// Graphics pipeline writing one `Rgba8Unorm` color target.
    pub fn graphics(vertex: &Shader, fragment: &Shader) -> Self {
        Self {
            vertex: Some(vertex.clone()),
            fragment: Some(fragment.clone()),
            color_targets: vec![ColorTargetState::new(TextureFormat::Rgba8Unorm)],
            ..Self::default()
        }
    }

    /// Graphics pipeline with no fragment stage (depth-only passes).
    pub fn vertex_only(vertex: &Shader) -> Self {
        Self {
            vertex: Some(vertex.clone()),
            ..Self::default()
        }
    }

    pub fn compute(shader: &Shader) -> Self {
        Self {
            compute: Some(shader.clone()),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_geometry(mut self, shader: &Shader) -> Self {
        self.geometry = Some(shader.clone());
        self
    }

    pub fn with_tessellation(mut self, control: &Shader, evaluation: &Shader) -> Self {
        self.tess_control = Some(control.clone());
        self.tess_evaluation = Some(evaluation.clone());
        self.topology = PrimitiveTopology::PatchList;
        self
    }

    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    pub fn with_bindings(mut self, bindings: BindingLayout) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_binding(mut self, entry: BindingLayoutEntry) -> Self {
        self.bindings.entries.push(entry);
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: RasterizerState) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilState) -> Self {
        self.depth_stencil = Some(depth_stencil);
        self
    }

    /// Replace the color targets.
    pub fn with_color_targets(mut self, targets: impl IntoIterator<Item = ColorTargetState>) -> Self {
        self.color_targets = targets.into_iter().collect();
        self
    }

    /// Shaders present in the descriptor, paired with the slot they occupy.
    pub fn shaders(&self) -> impl Iterator<Item = (ShaderStage, &Shader)> {
        [
            (ShaderStage::Vertex, &self.vertex),
            (ShaderStage::TessControl, &self.tess_control),
            (ShaderStage::TessEvaluation, &self.tess_evaluation),
            (ShaderStage::Geometry, &self.geometry),
            (ShaderStage::Fragment, &self.fragment),
            (ShaderStage::Compute, &self.compute),
        ]
        .into_iter()
        .filter_map(|(slot, shader)| shader.as_ref().map(|shader| (slot, shader)))
    }

    /// Stages present in the descriptor.
    pub fn stages(&self) -> ShaderStages {
        self.shaders()
            .fold(ShaderStages::empty(), |stages, (slot, _)| {
                stages | ShaderStages::from(slot)
            })
    }

    /// Runs the portable validation rules. Backend feature checks happen
    /// separately in `GpuBackend::validate_pipeline`.
    pub(crate) fn validate(&self, caps: &DeviceCapabilities) -> Result<PipelineKind, PipelineError> {
        let kind = self.validate_stages()?;

        for (_, shader) in self.shaders() {
            if shader.is_destroyed() {
                return Err(PipelineError::ShaderDestroyed(shader.id()));
            }
        }

        self.bindings.validate(self.stages())?;
        if kind == PipelineKind::Compute {
            return Ok(kind);
        }

        self.vertex_layout.validate(caps.max_vertex_buffers)?;
        self.validate_linkage()?;
        self.validate_targets(caps)?;
        Ok(kind)
    }

    fn validate_stages(&self) -> Result<PipelineKind, PipelineError> {
        for (slot, shader) in self.shaders() {
            if shader.stage() != slot {
                return Err(PipelineError::StageMismatch {
                    slot,
                    declared: shader.stage(),
                });
            }
        }

        let graphics = self.stages().difference(ShaderStages::COMPUTE);
        if self.compute.is_some() {
            if !graphics.is_empty() {
                return Err(PipelineError::MixedStages);
            }
            return Ok(PipelineKind::Compute);
        }

        if graphics.is_empty() {
            return Err(PipelineError::NoStages);
        }
        if self.vertex.is_none() {
            return Err(PipelineError::MissingVertexStage);
        }
        if self.tess_control.is_some() != self.tess_evaluation.is_some() {
            return Err(PipelineError::IncompleteTessellation);
        }
        Ok(PipelineKind::Graphics)
    }

    fn validate_linkage(&self) -> Result<(), PipelineError> {
        let Some(vertex) = &self.vertex else {
            return Err(PipelineError::MissingVertexStage);
        };

        let provided: Vec<ShaderVarying> = self
            .vertex_layout
            .attributes
            .iter()
            .map(|attr| ShaderVarying::new(attr.location, attr.format))
            .collect();
        link_stage(ShaderStage::Vertex, &provided, &vertex.interface().inputs)?;

        let mut previous = vertex;
        for shader in [
            &self.tess_control,
            &self.tess_evaluation,
            &self.geometry,
            &self.fragment,
        ]
        .into_iter()
        .flatten()
        {
            link_stage(
                shader.stage(),
                &previous.interface().outputs,
                &shader.interface().inputs,
            )?;
            previous = shader;
        }
        Ok(())
    }

    fn validate_targets(&self, caps: &DeviceCapabilities) -> Result<(), PipelineError> {
        if self.color_targets.len() > caps.max_color_attachments as usize {
            return Err(PipelineError::TooManyColorTargets {
                count: self.color_targets.len(),
                max: caps.max_color_attachments,
            });
        }
        if let Some(target) = self
            .color_targets
            .iter()
            .find(|target| target.format.is_depth_stencil())
        {
            return Err(PipelineError::InvalidColorFormat(target.format));
        }
        if let Some(depth) = &self.depth_stencil {
            if !depth.format.is_depth_stencil() {
                return Err(PipelineError::InvalidDepthFormat(depth.format));
            }
            if depth.uses_stencil() && !depth.format.has_stencil() {
                return Err(PipelineError::MissingStencil(depth.format));
            }
        }
        Ok(())
    }
}

/// Checks that `expected` inputs of `stage` are covered by `provided`.
fn link_stage(
    stage: ShaderStage,
    provided: &[ShaderVarying],
    expected: &[ShaderVarying],
) -> Result<(), PipelineError> {
    if expected.len() > provided.len() {
        return Err(PipelineError::InputCountMismatch {
            stage,
            expected: expected.len(),
            provided: provided.len(),
        });
    }
    for input in expected {
        let Some(output) = provided.iter().find(|v| v.location == input.location) else {
            return Err(PipelineError::UnlinkedInput {
                stage,
                location: input.location,
            });
        };
        if output.format != input.format {
            return Err(PipelineError::FormatMismatch {
                stage,
                location: input.location,
                expected: input.format,
                provided: output.format,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Pipeline
// ============================================================================

struct PipelineInner {
    tracker: Arc<ResourceTracker>,
    descriptor: PipelineDescriptor,
    kind: PipelineKind,
}

/// A compiled, immutable pipeline state object.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub(crate) fn new(
        tracker: Arc<ResourceTracker>,
        descriptor: PipelineDescriptor,
        kind: PipelineKind,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                tracker,
                descriptor,
                kind,
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.inner.tracker.id()
    }

    pub fn kind(&self) -> PipelineKind {
        self.inner.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.descriptor.label.as_deref()
    }

    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.inner.descriptor
    }

    pub fn vertex_layout(&self) -> &VertexLayout {
        &self.inner.descriptor.vertex_layout
    }

    pub fn bindings(&self) -> &BindingLayout {
        &self.inner.descriptor.bindings
    }

    pub fn color_targets(&self) -> &[ColorTargetState] {
        &self.inner.descriptor.color_targets
    }

    pub fn depth_stencil(&self) -> Option<&DepthStencilState> {
        self.inner.descriptor.depth_stencil.as_ref()
    }

    pub fn stages(&self) -> ShaderStages {
        self.inner.descriptor.stages()
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
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("label", &self.label())
            .finish()
    }
}

impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);
