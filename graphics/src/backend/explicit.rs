//! Explicit backend.
//!
//! Models APIs with immutable pipeline state objects and recorded command
//! buffers. Pipelines are compiled once at creation. Every submission starts
//! from a clean slate: nothing bound by one command list is visible to the
//! next, so each bind is applied as recorded.

use tessera_core::sync::AtomicCounter;

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
    BufferDescriptor, ClearMode, LoadOp, ShaderDescriptor, TextureDescriptor,
};

/// Software backend with the explicit, command-buffer programming model.
#[derive(Debug)]
pub struct ExplicitBackend {
    capabilities: DeviceCapabilities,
    heap: HostHeap,
    next_program: AtomicCounter,
}

impl ExplicitBackend {
    pub fn new(parameters: &DeviceParameters) -> Self {
        Self {
            capabilities: parameters
                .capabilities
                .unwrap_or(DeviceCapabilities::EXPLICIT),
            heap: HostHeap::new(parameters.device_loss_after, parameters.execution_latency),
            next_program: AtomicCounter::new(1),
        }
    }

    /// Number of live backend objects.
    pub fn object_count(&self) -> usize {
        self.heap.len()
    }

    fn require_pipeline(&self, handle: BackendHandle) -> Result<(), BackendError> {
        self.heap.with_object(handle, |object| match object {
            HostObject::Pipeline(_) => Ok(()),
            _ => Err(BackendError::InvalidHandle(handle)),
        })
    }
}

impl GpuBackend for ExplicitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Explicit
    }

    fn name(&self) -> &'static str {
        "explicit"
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BackendHandle, BackendError> {
        self.capabilities.check_buffer(descriptor)?;
        let handle = self.heap.insert(HostObject::Buffer(zeroed(descriptor.size)?))?;
        log::trace!(
            "ExplicitBackend: creating buffer {:?} (size: {}) as {}",
            descriptor.label,
            descriptor.size,
            handle.0
        );
        Ok(handle)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<BackendHandle, BackendError> {
        self.capabilities.check_texture(descriptor)?;
        let handle = self.heap.insert_texture(descriptor)?;
        log::trace!(
            "ExplicitBackend: creating texture {:?} ({}x{}x{}) as {}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            handle.0
        );
        Ok(handle)
    }

    fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<BackendHandle, BackendError> {
        self.heap.insert(HostObject::Shader(descriptor.stage))
    }

    fn validate_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<(), PipelineError> {
        self.capabilities.check_pipeline(self.name(), descriptor)
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<BackendHandle, BackendError> {
        let program = self.next_program.fetch_add(1);
        let handle = self.heap.insert(HostObject::Pipeline(program))?;
        log::trace!(
            "ExplicitBackend: compiled pipeline {:?} into program {program}",
            descriptor.label
        );
        Ok(handle)
    }

    fn destroy(&self, handle: BackendHandle) -> Result<(), BackendError> {
        self.heap.remove(handle).map(|_| ())
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
        let mut pipeline = None;
        let mut color_targets: Vec<BackendHandle> = Vec::new();

        for command in batch.commands {
            match command {
                Command::BeginRenderPass(pass) => {
                    report.passes += 1;
                    color_targets.clear();
                    for attachment in &pass.color_attachments {
                        let handle = attachment.target.texture().handle();
                        if let LoadOp::Clear(color) = attachment.load {
                            self.heap.fill_color(handle, color)?;
                            report.clears += 1;
                        }
                        color_targets.push(handle);
                    }
                }
                Command::EndRenderPass => color_targets.clear(),
                Command::BindPipeline(bound) => {
                    self.require_pipeline(bound.handle())?;
                    pipeline = Some(bound.handle());
                    report.state_changes += 1;
                }
                Command::BindVertexBuffer { .. }
                | Command::BindIndexBuffer { .. }
                | Command::BindBuffer { .. }
                | Command::BindTexture { .. }
                | Command::SetViewport(_)
                | Command::SetScissor(_)
                | Command::SetStencilReference(_) => report.state_changes += 1,
                Command::Clear { mode, color, .. } => {
                    if mode.contains(ClearMode::COLOR) {
                        for handle in &color_targets {
                            self.heap.fill_color(*handle, *color)?;
                        }
                    }
                    report.clears += 1;
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    if pipeline.is_none() {
                        return Err(BackendError::Internal("draw without a pipeline".into()));
                    }
                    report.draws += 1;
                }
                Command::Dispatch { .. } => report.dispatches += 1,
                Command::Barrier { .. } => report.barriers += 1,
            }
        }

        log::trace!(
            "ExplicitBackend: executed submission {} ({}): {:?}",
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
    use crate::types::{BufferKind, TextureFormat, TextureUsage};

    fn backend() -> ExplicitBackend {
        ExplicitBackend::new(&DeviceParameters::default())
    }

    #[test]
    fn test_buffer_lifecycle() {
        let backend = backend();
        let handle = backend
            .create_buffer(&BufferDescriptor::new(16, BufferKind::Constant))
            .unwrap();
        backend.write_buffer(handle, 0, &[7; 4]).unwrap();
        assert_eq!(backend.read_buffer(handle, 0, 4).unwrap(), vec![7; 4]);
        assert_eq!(backend.object_count(), 1);
        backend.destroy(handle).unwrap();
        assert_eq!(backend.object_count(), 0);
        assert_eq!(backend.destroy(handle), Err(BackendError::InvalidHandle(handle)));
    }

    #[test]
    fn test_renders_to_float_targets() {
        let backend = backend();
        let descriptor =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba32Float, TextureUsage::RENDER_TARGET);
        assert!(backend.create_texture(&descriptor).is_ok());
    }

    #[test]
    fn test_empty_batch_executes() {
        let backend = backend();
        let report = backend
            .execute(&SubmissionBatch {
                value: 1,
                list: crate::command::CommandList::new(crate::device::DeviceId::allocate()).id(),
                label: None,
                commands: &[],
            })
            .unwrap();
        assert_eq!(report, ExecutionReport::default());
    }

    #[test]
    fn test_device_loss_after_limit() {
        let backend = ExplicitBackend::new(&DeviceParameters::default().with_device_loss_after(0));
        let list = crate::command::CommandList::new(crate::device::DeviceId::allocate());
        let batch = SubmissionBatch {
            value: 1,
            list: list.id(),
            label: None,
            commands: &[],
        };
        assert!(matches!(backend.execute(&batch), Err(BackendError::DeviceLost(_))));
        assert!(backend.is_lost());
        assert!(matches!(
            backend.create_buffer(&BufferDescriptor::new(4, BufferKind::Storage)),
            Err(BackendError::DeviceLost(_))
        ));
    }
}
