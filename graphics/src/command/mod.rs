//! Command recording.
//!
//! A [`CommandList`] records GPU work on one thread and is then moved into
//! [`Device::submit`](crate::Device::submit). Its lifecycle:
//!
//! ```text
//! Initial ──begin──► Recording ──end──► Executable ──submit──► Submitted
//!    ▲                                                              │
//!    └────────────reset──────────── Retired ◄──fence signaled───────┘
//! ```
//!
//! Every recording call validates against the list's tracked state before
//! anything is appended. A rejected call leaves the list exactly as it was.
//!
//! Each distinct resource a list touches is referenced once. The reference
//! keeps the resource from being destroyed until the list retires or is
//! discarded.

mod pass;
mod pool;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use bitflags::bitflags;
use tessera_core::pool::Poolable;
use tessera_core::sync::AtomicCounter;

pub use pass::{ColorAttachment, DepthStencilAttachment, RenderPassDescriptor};
pub use pool::CommandListPool;

use crate::device::DeviceId;
use crate::error::{BindingSlot, GraphicsError};
use crate::pipeline::{BindingType, Pipeline, PipelineKind};
use crate::resources::{Buffer, RenderTarget, ResourceId, ResourceTracker, Texture};
use crate::scheduler::Fence;
use crate::types::{
    AttachmentRole, BufferKind, ClearMode, Color, IndexFormat, ScissorRect, TextureFormat,
    TextureUsage, Viewport,
};

static NEXT_LIST_ID: AtomicCounter = AtomicCounter::new(1);

/// Identifier of a recorded command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandListId(u64);

impl CommandListId {
    fn allocate() -> Self {
        Self(NEXT_LIST_ID.fetch_add(1))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list#{}", self.0)
    }
}

/// Recording state of a [`CommandList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    Initial,
    Recording,
    Executable,
    Submitted,
    Retired,
}

bitflags! {
    /// How a resource is accessed on either side of a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const VERTEX_INPUT = 1 << 0;
        const INDEX_INPUT = 1 << 1;
        const CONSTANT_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT = 1 << 5;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 6;
        const HOST_READ = 1 << 7;
        const HOST_WRITE = 1 << 8;
    }
}

/// Resource synchronized by a barrier.
#[derive(Debug, Clone, PartialEq)]
pub enum BarrierResource {
    Buffer(Buffer),
    Texture(Texture),
}

impl BarrierResource {
    fn tracker(&self) -> &Arc<ResourceTracker> {
        match self {
            Self::Buffer(buffer) => buffer.tracker(),
            Self::Texture(texture) => texture.tracker(),
        }
    }
}

impl From<&Buffer> for BarrierResource {
    fn from(buffer: &Buffer) -> Self {
        Self::Buffer(buffer.clone())
    }
}

impl From<&Texture> for BarrierResource {
    fn from(texture: &Texture) -> Self {
        Self::Texture(texture.clone())
    }
}

impl From<&RenderTarget> for BarrierResource {
    fn from(target: &RenderTarget) -> Self {
        Self::Texture(target.texture().clone())
    }
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    BindPipeline(Pipeline),
    BindVertexBuffer {
        slot: u32,
        buffer: Buffer,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: Buffer,
        format: IndexFormat,
        offset: u64,
    },
    BindBuffer {
        slot: u32,
        buffer: Buffer,
    },
    BindTexture {
        slot: u32,
        texture: Texture,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetStencilReference(u32),
    Clear {
        mode: ClearMode,
        color: Color,
        depth: f32,
        stencil: u32,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    Barrier {
        resource: BarrierResource,
        before: Access,
        after: Access,
    },
}

/// Attachment formats of the open render pass.
#[derive(Debug, Clone)]
struct OpenPass {
    default_framebuffer: bool,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
}

/// State tracked while recording, used to validate the next call.
#[derive(Debug, Default)]
struct Tracking {
    pipeline: Option<Pipeline>,
    pass: Option<OpenPass>,
    vertex_buffers: BTreeSet<u32>,
    index_buffer: bool,
}

/// An ordered list of recorded GPU commands.
///
/// Created by [`Device::command_list`](crate::Device::command_list). The list
/// is `Send` but not `Sync`: one thread records it, then ownership moves to
/// the device on submit.
pub struct CommandList {
    id: CommandListId,
    device: DeviceId,
    label: Option<String>,
    state: CommandListState,
    commands: Vec<Command>,
    references: HashMap<ResourceId, Arc<ResourceTracker>>,
    tracking: Tracking,
}

impl CommandList {
    pub(crate) fn new(device: DeviceId) -> Self {
        Self {
            id: CommandListId::allocate(),
            device,
            label: None,
            state: CommandListState::Initial,
            commands: Vec::new(),
            references: HashMap::new(),
            tracking: Tracking::default(),
        }
    }

    pub fn id(&self) -> CommandListId {
        self.id
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    /// Recorded commands, in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of distinct resources the list references.
    pub fn referenced_resources(&self) -> usize {
        self.references.len()
    }

    pub fn is_in_render_pass(&self) -> bool {
        self.tracking.pass.is_some()
    }

    pub(crate) fn device(&self) -> DeviceId {
        self.device
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start recording. Initial → Recording.
    pub fn begin(&mut self) -> Result<(), GraphicsError> {
        self.expect_state("begin", CommandListState::Initial)?;
        self.state = CommandListState::Recording;
        Ok(())
    }

    /// Finish recording. Recording → Executable.
    pub fn end(&mut self) -> Result<(), GraphicsError> {
        self.recording("end")?;
        if self.tracking.pass.is_some() {
            return Err(GraphicsError::missing("end", "the render pass to be ended"));
        }
        self.state = CommandListState::Executable;
        Ok(())
    }

    /// Make a retired list recordable again. Retired → Initial.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        self.expect_state("reset", CommandListState::Retired)?;
        self.clear_recording();
        self.state = CommandListState::Initial;
        Ok(())
    }

    /// Throw away everything recorded so far and release the references.
    ///
    /// Legal before submission. The list returns to Initial.
    pub fn discard(&mut self) -> Result<(), GraphicsError> {
        match self.state {
            CommandListState::Initial
            | CommandListState::Recording
            | CommandListState::Executable => {
                log::trace!("{}: discarded {} command(s)", self.id, self.commands.len());
                self.release_references(false);
                self.clear_recording();
                self.state = CommandListState::Initial;
                Ok(())
            }
            state => Err(GraphicsError::InvalidState {
                operation: "discard",
                state,
            }),
        }
    }

    // ========================================================================
    // Render passes
    // ========================================================================

    pub fn begin_render_pass(&mut self, pass: &RenderPassDescriptor) -> Result<(), GraphicsError> {
        self.recording("begin_render_pass")?;
        if self.tracking.pass.is_some() {
            return Err(GraphicsError::missing(
                "begin_render_pass",
                "the previous render pass to be ended",
            ));
        }

        check_attachments(pass)?;

        let targets: Vec<_> = pass
            .color_attachments
            .iter()
            .enumerate()
            .map(|(index, a)| (BindingSlot::ColorAttachment(index as u32), a.target.tracker()))
            .chain(
                pass.depth_stencil
                    .iter()
                    .map(|a| (BindingSlot::DepthStencil, a.target.tracker())),
            )
            .collect();
        self.reference_all(&targets)?;

        self.tracking.pass = Some(OpenPass {
            default_framebuffer: pass.is_default_framebuffer(),
            color_formats: pass.color_formats(),
            depth_format: pass.depth_stencil.as_ref().map(|a| a.target.format()),
        });
        self.commands.push(Command::BeginRenderPass(pass.clone()));
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<(), GraphicsError> {
        self.recording("end_render_pass")?;
        if self.tracking.pass.take().is_none() {
            return Err(GraphicsError::missing("end_render_pass", "an open render pass"));
        }
        self.commands.push(Command::EndRenderPass);
        Ok(())
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Bind a pipeline.
    ///
    /// Vertex buffer bindings survive only if the new pipeline uses the same
    /// vertex layout.
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), GraphicsError> {
        self.recording("bind_pipeline")?;
        self.reference(BindingSlot::Pipeline, pipeline.tracker())?;

        let same_layout = self
            .tracking
            .pipeline
            .as_ref()
            .is_some_and(|current| current.vertex_layout() == pipeline.vertex_layout());
        if !same_layout {
            self.tracking.vertex_buffers.clear();
        }
        self.tracking.pipeline = Some(pipeline.clone());
        self.commands.push(Command::BindPipeline(pipeline.clone()));
        Ok(())
    }

    pub fn bind_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: &Buffer,
        offset: u64,
    ) -> Result<(), GraphicsError> {
        self.recording("bind_vertex_buffer")?;
        let pipeline = self.bound_pipeline("bind_vertex_buffer")?;
        check_vertex_buffer(pipeline, slot, buffer, offset)?;

        self.reference(BindingSlot::VertexBuffer(slot), buffer.tracker())?;
        self.tracking.vertex_buffers.insert(slot);
        self.commands.push(Command::BindVertexBuffer {
            slot,
            buffer: buffer.clone(),
            offset,
        });
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64) -> Result<(), GraphicsError> {
        self.recording("bind_index_buffer")?;
        let format = check_index_buffer(buffer, offset)?;

        self.reference(BindingSlot::IndexBuffer, buffer.tracker())?;
        self.tracking.index_buffer = true;
        self.commands.push(Command::BindIndexBuffer {
            buffer: buffer.clone(),
            format,
            offset,
        });
        Ok(())
    }

    /// Bind a constant or storage buffer to a slot of the pipeline's binding
    /// layout.
    pub fn bind_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), GraphicsError> {
        self.recording("bind_buffer")?;
        let pipeline = self.bound_pipeline("bind_buffer")?;
        check_buffer_slot(pipeline, slot, buffer)?;

        self.reference(BindingSlot::Resource(slot), buffer.tracker())?;
        self.commands.push(Command::BindBuffer {
            slot,
            buffer: buffer.clone(),
        });
        Ok(())
    }

    /// Bind a texture to a slot of the pipeline's binding layout.
    pub fn bind_texture(&mut self, slot: u32, texture: &Texture) -> Result<(), GraphicsError> {
        self.recording("bind_texture")?;
        let pipeline = self.bound_pipeline("bind_texture")?;
        check_texture_slot(pipeline, slot, texture)?;

        self.reference(BindingSlot::Resource(slot), texture.tracker())?;
        self.commands.push(Command::BindTexture {
            slot,
            texture: texture.clone(),
        });
        Ok(())
    }

    // ========================================================================
    // Dynamic state
    // ========================================================================

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), GraphicsError> {
        self.recording("set_viewport")?;
        self.commands.push(Command::SetViewport(viewport));
        Ok(())
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) -> Result<(), GraphicsError> {
        self.recording("set_scissor")?;
        self.commands.push(Command::SetScissor(scissor));
        Ok(())
    }

    pub fn set_stencil_reference(&mut self, reference: u32) -> Result<(), GraphicsError> {
        self.recording("set_stencil_reference")?;
        self.commands.push(Command::SetStencilReference(reference));
        Ok(())
    }

    /// Clear the attachments of the open render pass.
    pub fn clear(
        &mut self,
        mode: ClearMode,
        color: Color,
        depth: f32,
        stencil: u32,
    ) -> Result<(), GraphicsError> {
        self.recording("clear")?;
        let Some(pass) = &self.tracking.pass else {
            return Err(GraphicsError::missing("clear", "an open render pass"));
        };
        if !pass.default_framebuffer
            && mode.intersects(ClearMode::DEPTH | ClearMode::STENCIL)
            && pass.depth_format.is_none()
        {
            return Err(GraphicsError::mismatch(
                BindingSlot::DepthStencil,
                "the render pass has no depth/stencil attachment",
            ));
        }
        self.commands.push(Command::Clear {
            mode,
            color,
            depth,
            stencil,
        });
        Ok(())
    }

    // ========================================================================
    // Work
    // ========================================================================

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> Result<(), GraphicsError> {
        self.recording("draw")?;
        self.check_draw("draw")?;
        self.commands.push(Command::Draw {
            vertices,
            instances,
        });
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> Result<(), GraphicsError> {
        self.recording("draw_indexed")?;
        self.check_draw("draw_indexed")?;
        if !self.tracking.index_buffer {
            return Err(GraphicsError::missing("draw_indexed", "a bound index buffer"));
        }
        self.commands.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError> {
        self.recording("dispatch")?;
        if self.tracking.pass.is_some() {
            return Err(GraphicsError::missing("dispatch", "the render pass to be ended"));
        }
        let compute = self
            .tracking
            .pipeline
            .as_ref()
            .is_some_and(|pipeline| pipeline.kind() == PipelineKind::Compute);
        if !compute {
            return Err(GraphicsError::missing("dispatch", "a bound compute pipeline"));
        }
        self.commands.push(Command::Dispatch { x, y, z });
        Ok(())
    }

    /// Order GPU accesses to a buffer or texture.
    pub fn barrier(
        &mut self,
        resource: impl Into<BarrierResource>,
        before: Access,
        after: Access,
    ) -> Result<(), GraphicsError> {
        self.recording("barrier")?;
        if self.tracking.pass.is_some() {
            return Err(GraphicsError::missing("barrier", "the render pass to be ended"));
        }
        let resource = resource.into();
        self.reference(BindingSlot::Barrier, resource.tracker())?;
        self.commands.push(Command::Barrier {
            resource,
            before,
            after,
        });
        Ok(())
    }

    // ========================================================================
    // Queue hooks
    // ========================================================================

    /// Marks every referenced resource as in flight behind `fence`.
    ///
    /// Fails without side effects if a referenced resource is mapped.
    pub(crate) fn mark_submitted(&mut self, fence: &Fence) -> Result<(), GraphicsError> {
        let mut flying: Vec<&Arc<ResourceTracker>> = Vec::with_capacity(self.references.len());
        for tracker in self.references.values() {
            if let Err(err) = tracker.begin_flight(fence) {
                for landed in flying {
                    landed.end_flight();
                }
                return Err(err);
            }
            flying.push(tracker);
        }
        self.state = CommandListState::Submitted;
        Ok(())
    }

    /// Releases all references after execution. Submitted → Retired.
    pub(crate) fn retire(&mut self) {
        self.release_references(self.state == CommandListState::Submitted);
        self.clear_recording();
        self.state = CommandListState::Retired;
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn expect_state(
        &self,
        operation: &'static str,
        expected: CommandListState,
    ) -> Result<(), GraphicsError> {
        if self.state != expected {
            return Err(GraphicsError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn recording(&self, operation: &'static str) -> Result<(), GraphicsError> {
        self.expect_state(operation, CommandListState::Recording)
    }

    fn bound_pipeline(&self, operation: &'static str) -> Result<&Pipeline, GraphicsError> {
        self.tracking
            .pipeline
            .as_ref()
            .ok_or_else(|| GraphicsError::missing(operation, "a bound pipeline"))
    }

    fn check_draw(&self, operation: &'static str) -> Result<(), GraphicsError> {
        let Some(pass) = &self.tracking.pass else {
            return Err(GraphicsError::missing(operation, "an open render pass"));
        };
        let Some(pipeline) = self
            .tracking
            .pipeline
            .as_ref()
            .filter(|pipeline| pipeline.kind() == PipelineKind::Graphics)
        else {
            return Err(GraphicsError::missing(operation, "a bound graphics pipeline"));
        };

        let buffer_count = pipeline.vertex_layout().buffer_count() as u32;
        if let Some(slot) = (0..buffer_count).find(|slot| !self.tracking.vertex_buffers.contains(slot)) {
            return Err(GraphicsError::missing(
                operation,
                format!("a vertex buffer bound to slot {slot}"),
            ));
        }

        if pass.default_framebuffer {
            return Ok(());
        }
        let targets = pipeline.color_targets();
        if targets.len() != pass.color_formats.len() {
            return Err(GraphicsError::mismatch(
                BindingSlot::ColorAttachment(targets.len().min(pass.color_formats.len()) as u32),
                format!(
                    "pipeline writes {} color target(s), the render pass has {}",
                    targets.len(),
                    pass.color_formats.len()
                ),
            ));
        }
        for (index, (target, format)) in targets.iter().zip(&pass.color_formats).enumerate() {
            if target.format != *format {
                return Err(GraphicsError::mismatch(
                    BindingSlot::ColorAttachment(index as u32),
                    format!("pipeline expects {:?}, attachment is {format:?}", target.format),
                ));
            }
        }
        match (pipeline.depth_stencil(), pass.depth_format) {
            (Some(state), Some(format)) if state.format != format => Err(GraphicsError::mismatch(
                BindingSlot::DepthStencil,
                format!("pipeline expects {:?}, attachment is {format:?}", state.format),
            )),
            (Some(_), None) => Err(GraphicsError::mismatch(
                BindingSlot::DepthStencil,
                "pipeline tests depth but the render pass has no depth attachment",
            )),
            _ => Ok(()),
        }
    }

    fn reference(&mut self, slot: BindingSlot, tracker: &Arc<ResourceTracker>) -> Result<(), GraphicsError> {
        self.reference_all(&[(slot, tracker)])
    }

    /// References every tracker or none of them.
    fn reference_all(&mut self, trackers: &[(BindingSlot, &Arc<ResourceTracker>)]) -> Result<(), GraphicsError> {
        let mut acquired: Vec<ResourceId> = Vec::new();
        for (slot, tracker) in trackers {
            let result = if tracker.device() != self.device {
                Err(GraphicsError::mismatch(*slot, "resource belongs to another device"))
            } else if self.references.contains_key(&tracker.id()) {
                tracker.ensure_usable()
            } else {
                tracker.acquire_reference().map(|()| {
                    self.references.insert(tracker.id(), Arc::clone(tracker));
                    acquired.push(tracker.id());
                })
            };

            if let Err(err) = result {
                for id in acquired {
                    if let Some(tracker) = self.references.remove(&id) {
                        tracker.release_reference();
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn release_references(&mut self, in_flight: bool) {
        for (_, tracker) in self.references.drain() {
            if in_flight {
                tracker.end_flight();
            }
            tracker.release_reference();
        }
    }

    fn clear_recording(&mut self) {
        self.commands.clear();
        self.tracking = Tracking::default();
    }
}

// ============================================================================
// Binding validation
// ============================================================================

/// Checks that `buffer` fits vertex buffer `slot` of the pipeline's layout.
pub(crate) fn check_vertex_buffer(
    pipeline: &Pipeline,
    slot: u32,
    buffer: &Buffer,
    offset: u64,
) -> Result<(), GraphicsError> {
    let binding = BindingSlot::VertexBuffer(slot);
    let layout = pipeline.vertex_layout();
    let Some(declared) = layout.buffers.get(slot as usize) else {
        return Err(GraphicsError::mismatch(
            binding,
            format!("the pipeline declares {} vertex buffer(s)", layout.buffer_count()),
        ));
    };
    match buffer.kind() {
        BufferKind::Vertex { stride } if stride == declared.stride => {}
        BufferKind::Vertex { stride } => {
            return Err(GraphicsError::mismatch(
                binding,
                format!(
                    "buffer stride {stride} does not match layout stride {}",
                    declared.stride
                ),
            ));
        }
        kind => {
            return Err(GraphicsError::mismatch(
                binding,
                format!("expected a vertex buffer, got a {kind}"),
            ));
        }
    }
    check_offset(binding, buffer, offset)
}

pub(crate) fn check_index_buffer(buffer: &Buffer, offset: u64) -> Result<IndexFormat, GraphicsError> {
    let BufferKind::Index(format) = buffer.kind() else {
        return Err(GraphicsError::mismatch(
            BindingSlot::IndexBuffer,
            format!("expected an index buffer, got a {}", buffer.kind()),
        ));
    };
    check_offset(BindingSlot::IndexBuffer, buffer, offset)?;
    Ok(format)
}

/// Checks that `buffer` matches the constant or storage slot `slot`.
pub(crate) fn check_buffer_slot(pipeline: &Pipeline, slot: u32, buffer: &Buffer) -> Result<(), GraphicsError> {
    let binding_type = declared_slot(pipeline, slot)?;
    let matches = matches!(
        (binding_type, buffer.kind()),
        (BindingType::ConstantBuffer, BufferKind::Constant)
            | (BindingType::StorageBuffer, BufferKind::Storage)
    );
    if !matches {
        return Err(GraphicsError::mismatch(
            BindingSlot::Resource(slot),
            format!("slot expects {binding_type:?}, got a {}", buffer.kind()),
        ));
    }
    Ok(())
}

/// Checks that `texture` matches the sampled or storage slot `slot`.
pub(crate) fn check_texture_slot(pipeline: &Pipeline, slot: u32, texture: &Texture) -> Result<(), GraphicsError> {
    let binding = BindingSlot::Resource(slot);
    let required = match declared_slot(pipeline, slot)? {
        BindingType::Texture => TextureUsage::SAMPLED,
        BindingType::StorageTexture => TextureUsage::STORAGE,
        other => {
            return Err(GraphicsError::mismatch(
                binding,
                format!("slot expects {other:?}, got a texture"),
            ));
        }
    };
    if !texture.usage().contains(required) {
        return Err(GraphicsError::mismatch(
            binding,
            format!("texture lacks {required:?} usage"),
        ));
    }
    Ok(())
}

/// Checks attachment roles and that all attachments share one size.
pub(crate) fn check_attachments(pass: &RenderPassDescriptor) -> Result<(), GraphicsError> {
    let mut extent = None;
    for (index, attachment) in pass.color_attachments.iter().enumerate() {
        let slot = BindingSlot::ColorAttachment(index as u32);
        check_extent(slot, &attachment.target, &mut extent)?;
        if attachment.target.role() != AttachmentRole::Color(index as u32) {
            return Err(GraphicsError::mismatch(
                slot,
                format!("render target is meant for {:?}", attachment.target.role()),
            ));
        }
    }
    if let Some(attachment) = &pass.depth_stencil {
        check_extent(BindingSlot::DepthStencil, &attachment.target, &mut extent)?;
        if attachment.target.role() != AttachmentRole::DepthStencil {
            return Err(GraphicsError::mismatch(
                BindingSlot::DepthStencil,
                format!("render target is meant for {:?}", attachment.target.role()),
            ));
        }
    }
    Ok(())
}

fn declared_slot(pipeline: &Pipeline, slot: u32) -> Result<BindingType, GraphicsError> {
    pipeline
        .bindings()
        .entry(slot)
        .map(|entry| entry.binding_type)
        .ok_or_else(|| {
            GraphicsError::mismatch(
                BindingSlot::Resource(slot),
                "slot is not declared by the bound pipeline",
            )
        })
}

fn check_extent(
    slot: BindingSlot,
    target: &RenderTarget,
    extent: &mut Option<(u32, u32)>,
) -> Result<(), GraphicsError> {
    let size = (target.width(), target.height());
    match extent {
        Some(expected) if *expected != size => Err(GraphicsError::mismatch(
            slot,
            format!(
                "attachment is {}x{}, the pass is {}x{}",
                size.0, size.1, expected.0, expected.1
            ),
        )),
        Some(_) => Ok(()),
        None => {
            *extent = Some(size);
            Ok(())
        }
    }
}

fn check_offset(slot: BindingSlot, buffer: &Buffer, offset: u64) -> Result<(), GraphicsError> {
    if offset >= buffer.size() {
        return Err(GraphicsError::mismatch(
            slot,
            format!("offset {offset} is past the end of a {}-byte buffer", buffer.size()),
        ));
    }
    Ok(())
}

impl Poolable for CommandList {
    fn recycle(&mut self) {
        self.release_references(self.state == CommandListState::Submitted);
        self.clear_recording();
        self.id = CommandListId::allocate();
        self.label = None;
        self.state = CommandListState::Initial;
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if !self.references.is_empty() {
            log::trace!(
                "{}: dropped in {:?} state, releasing {} reference(s)",
                self.id,
                self.state,
                self.references.len()
            );
        }
        self.release_references(self.state == CommandListState::Submitted);
    }
}

impl fmt::Debug for CommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandList")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state)
            .field("commands", &self.commands.len())
            .field("references", &self.references.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandList: Send);
