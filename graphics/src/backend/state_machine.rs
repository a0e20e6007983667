//! State-machine backend.
//!
//! Models GL-style drivers: one global set of bound state that every command
//! mutates in order and that persists from one submission to the next.
//! Binding what is already bound is filtered out, which is what such drivers
//! spend most of their CPU time on.

use std::collections::HashMap;

use tessera_core::sync::{AtomicCounter, Mutex};

use super::memory::{HostHeap, HostObject, zeroed};
use super::{
    BackendError, BackendHandle, BackendKind, DeviceCapabilities, ExecutionReport, GpuBackend,
    SubmissionBatch,
};
use crate::command::Command;
use crate::error::PipelineError;
use crate::parameters::DeviceParameters;
use crate::pipeline::PipelineDescriptor;
use crate::types::{
    BufferDescriptor, ClearMode, LoadOp, ScissorRect, ShaderDescriptor, TextureDescriptor,
    Viewport,
};

/// The driver's "currently bound" state.
#[derive(Debug, Default)]
struct BoundState {
    program: Option<BackendHandle>,
    vertex_buffers: HashMap<u32, (BackendHandle, u64)>,
    index_buffer: Option<(BackendHandle, u64)>,
    slots: HashMap<u32, BackendHandle>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    stencil_reference: u32,
    /// Color attachments of the bound framebuffer. Empty for the default one.
    framebuffer: Vec<BackendHandle>,
}

/// Replaces `current` with `value`, returning whether it changed.
fn apply<T: PartialEq>(current: &mut T, value: T) -> bool {
    if *current == value {
        return false;
    }
    *current = value;
    true
}

/// Software backend with the implicit, global-state programming model.
#[derive(Debug)]
pub struct StateMachineBackend {
    capabilities: DeviceCapabilities,
    heap: HostHeap,
    state: Mutex<BoundState>,
    next_program: AtomicCounter,
}

impl StateMachineBackend {
    pub fn new(parameters: &DeviceParameters) -> Self {
        Self {
            capabilities: parameters
                .capabilities
                .unwrap_or(DeviceCapabilities::STATE_MACHINE),
            heap: HostHeap::new(parameters.device_loss_after, parameters.execution_latency),
            state: Mutex::new(BoundState::default()),
            next_program: AtomicCounter::new(1),
        }
    }

    /// Number of live backend objects.
    pub fn object_count(&self) -> usize {
        self.heap.len()
    }
}

impl GpuBackend for StateMachineBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::StateMachine
    }

    fn name(&self) -> &'static str {
        "state-machine"
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BackendHandle, BackendError> {
        self.capabilities.check_buffer(descriptor)?;
        let handle = self.heap.insert(HostObject::Buffer(zeroed(descriptor.size)?))?;
        log::trace!(
            "StateMachineBackend: creating buffer {:?} (size: {}) as {}",
            descriptor.label,
            descriptor.size,
            handle.0
        );
        Ok(handle)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<BackendHandle, BackendError> {
        self.capabilities.check_texture(descriptor)?;
        self.heap.insert_texture(descriptor)
    }

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<BackendHandle, BackendError> {
        self.heap.insert(HostObject::Shader(descriptor.stage))
    }

    fn validate_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<(), PipelineError> {
        self.capabilities.check_pipeline(self.name(), descriptor)?;
        if !super::uniform_blend(descriptor) {
            return Err(PipelineError::Unsupported {
                backend: self.name(),
                feature: "different blend state per color target".into(),
            });
        }
        Ok(())
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<BackendHandle, BackendError> {
        let program = self.next_program.fetch_add(1);
        log::trace!(
            "StateMachineBackend: linked program {program} for pipeline {:?}",
            descriptor.label
        );
        self.heap.insert(HostObject::Pipeline(program))
    }

    fn destroy(&self, handle: BackendHandle) -> Result<(), BackendError> {
        self.heap.remove(handle)?;
        // Deleting a bound object unbinds it.
        let mut state = self.state.lock();
        if state.program == Some(handle) {
            state.program = None;
        }
        state.vertex_buffers.retain(|_, (bound, _)| *bound != handle);
        if state.index_buffer.is_some_and(|(bound, _)| bound == handle) {
            state.index_buffer = None;
        }
        state.slots.retain(|_, bound| *bound != handle);
        if state.framebuffer.contains(&handle) {
            state.framebuffer.clear();
        }
        Ok(())
    }

    fn write_buffer(&self, handle: BackendHandle, offset: u64, data: &[u8]) -> Result<(), BackendError> {
        self.heap.write_buffer(handle, offset, data)
    }

    fn read_buffer(&self, handle: BackendHandle, offset: u64, size: u64) -> Result<Vec<u8>, BackendError> {
        self.heap.read_buffer(handle, offset, size)
    }

    fn write_texture(&self, handle: BackendHandle, mip: u32, data: &[u8]) -> Result<(), BackendError> {
        self.heap.write_texture(handle, mip, data)
    }

    fn read_texture(&self, handle: BackendHandle, mip: u32) -> Result<Vec<u8>, BackendError> {
        self.heap.read_texture(handle, mip)
    }

    fn execute(&self, batch: &SubmissionBatch<'_>) -> Result<ExecutionReport, BackendError> {
        self.heap.begin_execution(self.name(), batch.value)?;

        let mut report = ExecutionReport::default();
        let mut state = self.state.lock();

        for command in batch.commands {
            let changed = match command {
                Command::BeginRenderPass(pass) => {
                    report.passes += 1;
                    let framebuffer: Vec<_> = pass
                        .color_attachments
                        .iter()
                        .map(|attachment| attachment.target.texture().handle())
                        .collect();
                    let changed = apply(&mut state.framebuffer, framebuffer);
                    for attachment in &pass.color_attachments {
                        if let LoadOp::Clear(color) = attachment.load {
                            self.heap.fill_color(attachment.target.texture().handle(), color)?;
                            report.clears += 1;
                        }
                    }
                    changed
                }
                Command::EndRenderPass => false,
                Command::BindPipeline(pipeline) => apply(&mut state.program, Some(pipeline.handle())),
                Command::BindVertexBuffer {
                    slot,
                    buffer,
                    offset,
                } => {
                    let binding = (buffer.handle(), *offset);
                    state.vertex_buffers.insert(*slot, binding) != Some(binding)
                }
                Command::BindIndexBuffer { buffer, offset, .. } => {
                    apply(&mut state.index_buffer, Some((buffer.handle(), *offset)))
                }
                Command::BindBuffer { slot, buffer } => {
                    state.slots.insert(*slot, buffer.handle()) != Some(buffer.handle())
                }
                Command::BindTexture { slot, texture } => {
                    state.slots.insert(*slot, texture.handle()) != Some(texture.handle())
                }
                Command::SetViewport(viewport) => apply(&mut state.viewport, Some(*viewport)),
                Command::SetScissor(scissor) => apply(&mut state.scissor, Some(*scissor)),
                Command::SetStencilReference(reference) => {
                    apply(&mut state.stencil_reference, *reference)
                }
                Command::Clear { mode, color, .. } => {
                    if mode.contains(ClearMode::COLOR) {
                        for handle in &state.framebuffer {
                            self.heap.fill_color(*handle, *color)?;
                        }
                    }
                    report.clears += 1;
                    false
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    if state.program.is_none() {
                        return Err(BackendError::Internal("draw with no program bound".into()));
                    }
                    report.draws += 1;
                    false
                }
                Command::Dispatch { .. } => {
                    report.dispatches += 1;
                    false
                }
                Command::Barrier { .. } => {
                    report.barriers += 1;
                    false
                }
            };
            if changed {
                report.state_changes += 1;
            }
        }
        drop(state);

        log::trace!(
            "StateMachineBackend: executed submission {} ({}): {:?}",
            batch.value,
            batch.list,
            report
        );
        Ok(report)
    }

    fn is_lost(&self) -> bool {
        self.heap.is_lost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BlendState, ColorTargetState};
    use crate::types::{TextureFormat, TextureUsage};

    fn backend() -> StateMachineBackend {
        StateMachineBackend::new(&DeviceParameters::default())
    }

    #[test]
    fn test_apply_filters_redundant_values() {
        let mut current = Some(3);
        assert!(!apply(&mut current, Some(3)));
        assert!(apply(&mut current, Some(4)));
        assert_eq!(current, Some(4));
    }

    #[test]
    fn test_rejects_float_render_targets() {
        let descriptor =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba32Float, TextureUsage::RENDER_TARGET);
        assert!(matches!(
            backend().create_texture(&descriptor),
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_independent_blend() {
        let descriptor = PipelineDescriptor::default().with_color_targets([
            ColorTargetState::new(TextureFormat::Rgba8Unorm).with_blend(BlendState::additive()),
            ColorTargetState::new(TextureFormat::Rgba8Unorm),
        ]);
        assert!(matches!(
            backend().validate_pipeline(&descriptor),
            Err(PipelineError::Unsupported { backend: "state-machine", .. })
        ));
    }

    #[test]
    fn test_destroy_unbinds() {
        let backend = backend();
        let handle = backend
            .create_buffer(&BufferDescriptor::constant(16))
            .unwrap();
        backend.state.lock().slots.insert(0, handle);
        backend.destroy(handle).unwrap();
        assert!(backend.state.lock().slots.is_empty());
    }
}
