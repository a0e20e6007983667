//! Immediate-mode rendering on top of command lists.
//!
//! [`ImmediateContext`] keeps a "currently set" pipeline, buffers, textures
//! and targets the way state-machine APIs do. Every draw, clear or dispatch
//! records a short command list from that state, submits it and waits for
//! its fence before returning. Resource registration and in-use rules are
//! the ones of [`Device`]; nothing stays in flight between calls. Draws,
//! clears and dispatches need an open frame.
//!
//! Setters validate eagerly against the current pipeline, so a bad binding
//! fails where it is made, not at the next draw.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_graphics::*;
//!
//! let device = Arc::new(Device::new(DeviceParameters::default()).unwrap());
//! let target = device
//!     .create_render_target(
//!         &RenderTargetDescriptor::color(2, 2, TextureFormat::Rgba8Unorm, 0)
//!             .with_usage(TextureUsage::READBACK),
//!     )
//!     .unwrap();
//!
//! let mut context = ImmediateContext::new(Arc::clone(&device));
//! context.begin_frame().unwrap();
//! context.set_render_targets(&[&target], None).unwrap();
//! context
//!     .clear(ClearMode::COLOR, Color::new(0.0, 0.0, 1.0, 1.0), 1.0, 0)
//!     .unwrap();
//! let frame = context.end_frame().unwrap();
//! assert_eq!(frame.clears, 1);
//! assert_eq!(&target.texture().read(0).unwrap()[..4], &[0, 0, 255, 255]);
//! ```

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use tessera_core::sync::Timeout;

use crate::command::{
    self, ColorAttachment, CommandList, DepthStencilAttachment, RenderPassDescriptor,
};
use crate::device::Device;
use crate::error::{BindingSlot, GraphicsError};
use crate::pipeline::{Pipeline, PipelineKind};
use crate::resources::{Buffer, RenderTarget, Texture};
use crate::scheduler::Submission;
use crate::types::{ClearMode, Color, ScissorRect, Viewport};

/// Work done between [`ImmediateContext::begin_frame`] and
/// [`ImmediateContext::end_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatistics {
    pub draws: u64,
    pub dispatches: u64,
    pub clears: u64,
    pub submissions: u64,
}

#[derive(Debug, Clone, Default)]
struct CurrentState {
    pipeline: Option<Pipeline>,
    vertex_buffers: BTreeMap<u32, Buffer>,
    index_buffer: Option<Buffer>,
    constant_buffers: BTreeMap<u32, Buffer>,
    textures: BTreeMap<u32, Texture>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    stencil_reference: Option<u32>,
    targets: RenderPassDescriptor,
}

#[derive(Debug, Default)]
struct Frame {
    statistics: FrameStatistics,
    last: Option<Submission>,
}

/// Immediate-mode state and draw calls bound to one device.
#[derive(Debug)]
pub struct ImmediateContext {
    device: Arc<Device>,
    state: CurrentState,
    frame: Option<Frame>,
}

impl ImmediateContext {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            state: CurrentState::default(),
            frame: None,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The currently set pipeline.
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.state.pipeline.as_ref()
    }

    // ========================================================================
    // Frames
    // ========================================================================

    pub fn begin_frame(&mut self) -> Result<(), GraphicsError> {
        if self.frame.is_some() {
            return Err(GraphicsError::missing(
                "begin_frame",
                "the previous frame to be ended",
            ));
        }
        self.frame = Some(Frame::default());
        Ok(())
    }

    /// Close the frame once all of its work completed.
    pub fn end_frame(&mut self) -> Result<FrameStatistics, GraphicsError> {
        let Some(frame) = self.frame.take() else {
            return Err(GraphicsError::missing("end_frame", "an open frame"));
        };
        if let Some(last) = &frame.last {
            last.wait(Timeout::Infinite)?;
        }
        log::trace!("ImmediateContext: frame ended: {:?}", frame.statistics);
        Ok(frame.statistics)
    }

    pub fn in_frame(&self) -> bool {
        self.frame.is_some()
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Set the pipeline. Bindings the new pipeline cannot use are dropped.
    pub fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), GraphicsError> {
        pipeline.tracker().ensure_usable()?;
        let state = &mut self.state;
        let same_layout = state
            .pipeline
            .as_ref()
            .is_some_and(|current| current.vertex_layout() == pipeline.vertex_layout());
        if !same_layout {
            state.vertex_buffers.clear();
        }
        state
            .constant_buffers
            .retain(|slot, buffer| command::check_buffer_slot(pipeline, *slot, buffer).is_ok());
        state
            .textures
            .retain(|slot, texture| command::check_texture_slot(pipeline, *slot, texture).is_ok());
        state.pipeline = Some(pipeline.clone());
        Ok(())
    }

    /// Set vertex buffer slot 0.
    pub fn set_vertex_buffer(&mut self, buffer: &Buffer) -> Result<(), GraphicsError> {
        self.set_vertex_buffers(&[buffer])
    }

    /// Set vertex buffer slots `0..buffers.len()`.
    pub fn set_vertex_buffers(&mut self, buffers: &[&Buffer]) -> Result<(), GraphicsError> {
        let pipeline = self.current_pipeline("set_vertex_buffers")?;
        for (slot, buffer) in buffers.iter().enumerate() {
            command::check_vertex_buffer(pipeline, slot as u32, buffer, 0)?;
        }
        self.state.vertex_buffers = buffers
            .iter()
            .enumerate()
            .map(|(slot, buffer)| (slot as u32, (*buffer).clone()))
            .collect();
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &Buffer) -> Result<(), GraphicsError> {
        command::check_index_buffer(buffer, 0)?;
        self.state.index_buffer = Some(buffer.clone());
        Ok(())
    }

    /// Set a constant or storage buffer slot of the current pipeline.
    pub fn set_constant_buffer(&mut self, slot: u32, buffer: &Buffer) -> Result<(), GraphicsError> {
        let pipeline = self.current_pipeline("set_constant_buffer")?;
        command::check_buffer_slot(pipeline, slot, buffer)?;
        self.state.constant_buffers.insert(slot, buffer.clone());
        Ok(())
    }

    pub fn set_texture(&mut self, slot: u32, texture: &Texture) -> Result<(), GraphicsError> {
        let pipeline = self.current_pipeline("set_texture")?;
        command::check_texture_slot(pipeline, slot, texture)?;
        self.state.textures.insert(slot, texture.clone());
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        self.state.scissor = Some(scissor);
    }

    pub fn disable_scissor(&mut self) {
        self.state.scissor = None;
    }

    pub fn set_stencil_reference(&mut self, reference: u32) {
        self.state.stencil_reference = Some(reference);
    }

    /// Render into `colors` (attachment slots in order) and `depth`.
    pub fn set_render_targets(
        &mut self,
        colors: &[&RenderTarget],
        depth: Option<&RenderTarget>,
    ) -> Result<(), GraphicsError> {
        let mut targets = RenderPassDescriptor::default().with_label("immediate");
        for target in colors {
            target.tracker().ensure_usable()?;
            targets = targets.with_color(ColorAttachment::new(target));
        }
        if let Some(target) = depth {
            target.tracker().ensure_usable()?;
            targets = targets.with_depth_stencil(DepthStencilAttachment::new(target));
        }
        if targets.color_attachments.len() > self.device.capabilities().max_color_attachments as usize {
            return Err(GraphicsError::mismatch(
                BindingSlot::ColorAttachment(self.device.capabilities().max_color_attachments),
                "more color targets than the device supports",
            ));
        }
        command::check_attachments(&targets)?;
        self.state.targets = targets;
        Ok(())
    }

    /// Render into the default framebuffer again.
    pub fn restore_default_target(&mut self) {
        self.state.targets = RenderPassDescriptor::default_framebuffer();
    }

    // ========================================================================
    // Work
    // ========================================================================

    /// Clear the current render targets.
    pub fn clear(
        &mut self,
        mode: ClearMode,
        color: Color,
        depth: f32,
        stencil: u32,
    ) -> Result<(), GraphicsError> {
        self.open_frame("clear")?;
        self.run(|list, state| {
            list.begin_render_pass(&state.targets)?;
            list.clear(mode, color, depth, stencil)?;
            list.end_render_pass()
        })?;
        self.record_stat(|stats| stats.clears += 1);
        Ok(())
    }

    /// Draw every index of the current index buffer.
    pub fn draw_indexed_vertices(&mut self) -> Result<(), GraphicsError> {
        let count = self.index_count("draw_indexed_vertices")?;
        self.draw_indexed_vertices_instanced(1, 0, count, 0)
    }

    /// Draw `count` indices starting at index `start`.
    pub fn draw_indexed_vertices_from_to(&mut self, start: u32, count: u32) -> Result<(), GraphicsError> {
        self.draw_indexed_vertices_instanced(1, start, count, 0)
    }

    /// Draw `count` indices starting at `start`, adding `vertex_offset` to
    /// every index.
    pub fn draw_indexed_vertices_from_to_from(
        &mut self,
        start: u32,
        count: u32,
        vertex_offset: i32,
    ) -> Result<(), GraphicsError> {
        self.draw_indexed_vertices_instanced(1, start, count, vertex_offset)
    }

    /// Draw `instances` instances of `count` indices.
    pub fn draw_indexed_vertices_instanced(
        &mut self,
        instances: u32,
        start: u32,
        count: u32,
        vertex_offset: i32,
    ) -> Result<(), GraphicsError> {
        self.open_frame("draw_indexed")?;
        let available = self.index_count("draw_indexed")?;
        let end = start.checked_add(count).filter(|end| *end <= available);
        let Some(end) = end else {
            return Err(GraphicsError::mismatch(
                BindingSlot::IndexBuffer,
                format!("indices {start}..{} exceed the {available} in the buffer", u64::from(start) + u64::from(count)),
            ));
        };

        self.run(|list, state| {
            record_graphics_state(list, state)?;
            list.draw_indexed(start..end, vertex_offset, 0..instances)?;
            list.end_render_pass()
        })?;
        self.record_stat(|stats| stats.draws += 1);
        Ok(())
    }

    /// Draw non-indexed vertices.
    pub fn draw(&mut self, vertices: Range<u32>) -> Result<(), GraphicsError> {
        self.open_frame("draw")?;
        self.run(|list, state| {
            record_graphics_state(list, state)?;
            list.draw(vertices, 0..1)?;
            list.end_render_pass()
        })?;
        self.record_stat(|stats| stats.draws += 1);
        Ok(())
    }

    /// Run the current compute pipeline.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError> {
        self.open_frame("dispatch")?;
        let pipeline = self.current_pipeline("dispatch")?;
        if pipeline.kind() != PipelineKind::Compute {
            return Err(GraphicsError::missing("dispatch", "a compute pipeline"));
        }
        self.run(|list, state| {
            record_bindings(list, state)?;
            list.dispatch(x, y, z)
        })?;
        self.record_stat(|stats| stats.dispatches += 1);
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn current_pipeline(&self, operation: &'static str) -> Result<&Pipeline, GraphicsError> {
        self.state
            .pipeline
            .as_ref()
            .ok_or_else(|| GraphicsError::missing(operation, "a pipeline set"))
    }

    fn open_frame(&self, operation: &'static str) -> Result<(), GraphicsError> {
        if self.frame.is_none() {
            return Err(GraphicsError::missing(operation, "an open frame"));
        }
        Ok(())
    }

    fn index_count(&self, operation: &'static str) -> Result<u32, GraphicsError> {
        let Some(buffer) = &self.state.index_buffer else {
            return Err(GraphicsError::missing(operation, "an index buffer set"));
        };
        let count = buffer.element_count().unwrap_or(0);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn record_stat(&mut self, update: impl FnOnce(&mut FrameStatistics)) {
        if let Some(frame) = &mut self.frame {
            update(&mut frame.statistics);
        }
    }

    /// Record a list from the current state, submit it and wait for it.
    fn run(
        &mut self,
        record: impl FnOnce(&mut CommandList, &CurrentState) -> Result<(), GraphicsError>,
    ) -> Result<(), GraphicsError> {
        let mut list = self.device.command_list();
        list.set_label("immediate");
        let recorded = list
            .begin()
            .and_then(|()| record(&mut list, &self.state))
            .and_then(|()| list.end());
        if let Err(err) = recorded {
            self.device.recycle(list);
            return Err(err);
        }

        let submission = self.device.submit_transient(list).map_err(|err| {
            let (error, list) = err.into_parts();
            self.device.recycle(list);
            error
        })?;
        self.device.drive();
        submission.wait(Timeout::Infinite)?;

        if let Some(frame) = &mut self.frame {
            frame.statistics.submissions += 1;
            frame.last = Some(submission);
        }
        Ok(())
    }
}

fn record_graphics_state(list: &mut CommandList, state: &CurrentState) -> Result<(), GraphicsError> {
    list.begin_render_pass(&state.targets)?;
    if let Some(viewport) = state.viewport {
        list.set_viewport(viewport)?;
    }
    if let Some(scissor) = state.scissor {
        list.set_scissor(scissor)?;
    }
    if let Some(reference) = state.stencil_reference {
        list.set_stencil_reference(reference)?;
    }
    record_bindings(list, state)?;
    for (slot, buffer) in &state.vertex_buffers {
        list.bind_vertex_buffer(*slot, buffer, 0)?;
    }
    if let Some(buffer) = &state.index_buffer {
        list.bind_index_buffer(buffer, 0)?;
    }
    Ok(())
}

fn record_bindings(list: &mut CommandList, state: &CurrentState) -> Result<(), GraphicsError> {
    let Some(pipeline) = &state.pipeline else {
        return Err(GraphicsError::missing("draw", "a pipeline set"));
    };
    list.bind_pipeline(pipeline)?;
    for (slot, buffer) in &state.constant_buffers {
        list.bind_buffer(*slot, buffer)?;
    }
    for (slot, texture) in &state.textures {
        list.bind_texture(*slot, texture)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{CompletionMode, DeviceParameters};
    use crate::types::{BufferDescriptor, IndexFormat};

    fn context(completion: CompletionMode) -> ImmediateContext {
        let device = Device::new(DeviceParameters::default().with_completion(completion)).unwrap();
        ImmediateContext::new(Arc::new(device))
    }

    #[test]
    fn test_frames_must_pair() {
        let mut context = context(CompletionMode::Manual);
        assert!(matches!(context.end_frame(), Err(GraphicsError::MissingState { .. })));
        context.begin_frame().unwrap();
        assert!(matches!(context.begin_frame(), Err(GraphicsError::MissingState { .. })));
        assert_eq!(context.end_frame(), Ok(FrameStatistics::default()));
    }

    #[test]
    fn test_clear_requires_frame() {
        let mut context = context(CompletionMode::Background);
        assert_eq!(
            context.clear(ClearMode::COLOR, Color::BLACK, 1.0, 0),
            Err(GraphicsError::missing("clear", "an open frame"))
        );
    }

    #[test]
    fn test_manual_mode_completes_synchronously() {
        let mut context = context(CompletionMode::Manual);
        context.begin_frame().unwrap();
        context.clear(ClearMode::COLOR, Color::WHITE, 1.0, 0).unwrap();
        assert_eq!(context.device().outstanding_submissions(), 0);
        let stats = context.end_frame().unwrap();
        assert_eq!(stats.clears, 1);
        assert_eq!(stats.submissions, 1);
    }

    #[test]
    fn test_bindings_need_a_pipeline() {
        let mut context = context(CompletionMode::Manual);
        let buffer = context
            .device()
            .create_buffer(&BufferDescriptor::constant(64))
            .unwrap();
        assert_eq!(
            context.set_constant_buffer(0, &buffer),
            Err(GraphicsError::missing("set_constant_buffer", "a pipeline set"))
        );
    }

    #[test]
    fn test_index_range_is_checked() {
        let mut context = context(CompletionMode::Manual);
        let indices = context
            .device()
            .create_buffer(&BufferDescriptor::index(3, IndexFormat::Uint16))
            .unwrap();
        context.set_index_buffer(&indices).unwrap();
        context.begin_frame().unwrap();
        assert!(matches!(
            context.draw_indexed_vertices_from_to(2, 2),
            Err(GraphicsError::BindingMismatch {
                slot: BindingSlot::IndexBuffer,
                ..
            })
        ));
    }
}
