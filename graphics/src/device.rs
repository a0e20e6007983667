//! Graphics device.
//!
//! The [`Device`] is the main interface for creating GPU resources and
//! submitting work. It owns the backend, the live-resource registry and the
//! submission queue. Several devices can coexist; nothing is global.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use tessera_core::sync::{AtomicCounter, Timeout, WaitResult};

use crate::backend::{self, BackendError, BackendKind, DeviceCapabilities, GpuBackend};
use crate::command::{CommandList, CommandListPool};
use crate::error::{
    BindingSlot, GraphicsError, RejectedDescriptor, ShutdownError, SubmitError,
};
use crate::parameters::{CompletionMode, DeviceParameters};
use crate::pipeline::{Pipeline, PipelineDescriptor};
use crate::resources::{
    Buffer, LiveResource, RenderTarget, ResourceKind, ResourceRegistry, ResourceTracker, Shader,
    Texture,
};
use crate::scheduler::{Fence, QueueStatistics, Submission, SubmissionQueue};
use crate::types::{
    AttachmentRole, BufferDescriptor, BufferKind, RenderTargetDescriptor, ShaderDescriptor,
    TextureDescriptor, TextureUsage, Usage,
};

static NEXT_DEVICE_ID: AtomicCounter = AtomicCounter::new(1);

/// Identifier of a device, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    pub(crate) fn allocate() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// A logical GPU: resource factory and ordered submission queue.
///
/// # Thread Safety
///
/// `Device` is `Send + Sync`. Resources can be created and command lists
/// submitted from any thread. [`submit`](Self::submit) takes the queue lock
/// only for the enqueue itself and never waits for execution.
///
/// # Lifecycle
///
/// Call [`shutdown`](Self::shutdown) at teardown. It refuses while
/// submissions are outstanding and warns about every resource that was
/// never destroyed. Dropping a busy device drains its queue first.
///
/// # Example
///
/// ```
/// use tessera_graphics::*;
///
/// let device = Device::new(DeviceParameters::default()).unwrap();
/// let target = device
///     .create_render_target(&RenderTargetDescriptor::color(4, 4, TextureFormat::Rgba8Unorm, 0))
///     .unwrap();
///
/// let mut list = device.command_list();
/// list.begin().unwrap();
/// list.begin_render_pass(
///     &RenderPassDescriptor::default().with_color(ColorAttachment::cleared(&target, Color::BLACK)),
/// )
/// .unwrap();
/// list.end_render_pass().unwrap();
/// list.end().unwrap();
///
/// let submission = device.submit(list).unwrap();
/// assert_eq!(submission.wait(Timeout::Infinite), Ok(WaitResult::Signaled));
///
/// device.destroy_render_target(&target).unwrap();
/// device.shutdown().unwrap();
/// ```
pub struct Device {
    id: DeviceId,
    parameters: DeviceParameters,
    backend: Arc<dyn GpuBackend>,
    registry: ResourceRegistry,
    pool: Arc<CommandListPool>,
    queue: Arc<SubmissionQueue>,
    worker: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl Device {
    /// Create a device with the backend and completion mode of `parameters`.
    pub fn new(parameters: DeviceParameters) -> Result<Self, GraphicsError> {
        let id = DeviceId::allocate();
        let backend = backend::create_backend(&parameters);
        let pool = Arc::new(CommandListPool::with_capacity(
            id,
            parameters.command_list_pool_capacity,
        ));
        let queue = Arc::new(SubmissionQueue::new(Arc::clone(&backend), Arc::clone(&pool)));

        let worker = match parameters.completion {
            CompletionMode::Background => {
                let queue = Arc::clone(&queue);
                let handle = std::thread::Builder::new()
                    .name(format!("tessera-queue-{}", id.raw()))
                    .spawn(move || queue.run_worker())
                    .map_err(|err| {
                        GraphicsError::BackendFatal(format!("failed to spawn queue worker: {err}"))
                    })?;
                Some(handle)
            }
            CompletionMode::Manual => None,
        };

        log::info!(
            "Device: created {id} {:?} on {} backend ({:?} completion)",
            parameters.label,
            backend.name(),
            parameters.completion
        );

        Ok(Self {
            id,
            registry: ResourceRegistry::new(id),
            parameters,
            backend,
            pool,
            queue,
            worker,
            torn_down: false,
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.parameters.label.as_deref()
    }

    pub fn parameters(&self) -> &DeviceParameters {
        &self.parameters
    }

    /// Features and limits of the backend.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        self.backend.capabilities()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn completion_mode(&self) -> CompletionMode {
        self.parameters.completion
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    /// Create a buffer.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Buffer, GraphicsError> {
        let reject = |reason: &str| {
            GraphicsError::rejected(RejectedDescriptor::Buffer(descriptor.clone()), reason)
        };
        if descriptor.size == 0 {
            return Err(reject("size is zero"));
        }
        match descriptor.kind {
            BufferKind::Vertex { stride: 0 } => return Err(reject("vertex stride is zero")),
            BufferKind::Vertex { stride } if descriptor.size % u64::from(stride) != 0 => {
                return Err(reject("size is not a multiple of the vertex stride"));
            }
            BufferKind::Index(format) if descriptor.size % format.size() != 0 => {
                return Err(reject("size is not a multiple of the index size"));
            }
            _ => {}
        }

        let handle = self
            .backend
            .create_buffer(descriptor)
            .map_err(|err| self.creation_error(err, RejectedDescriptor::Buffer(descriptor.clone())))?;
        let tracker = self.registry.register(
            ResourceKind::Buffer,
            descriptor.label.clone(),
            handle,
            descriptor.usage,
        );
        log::trace!(
            "Device: created {} buffer {} {:?} (size: {})",
            descriptor.kind,
            tracker.id(),
            descriptor.label,
            descriptor.size
        );
        Ok(Buffer::new(tracker, descriptor.clone(), Arc::clone(&self.backend)))
    }

    /// Create a texture.
    pub fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<Texture, GraphicsError> {
        let rejected = || RejectedDescriptor::Texture(descriptor.clone());
        check_texture_descriptor(descriptor)
            .map_err(|reason| GraphicsError::rejected(rejected(), reason))?;

        let handle = self
            .backend
            .create_texture(descriptor)
            .map_err(|err| self.creation_error(err, rejected()))?;
        let tracker = self.registry.register(
            ResourceKind::Texture,
            descriptor.label.clone(),
            handle,
            descriptor.access,
        );
        log::trace!(
            "Device: created texture {} {:?} ({}x{}x{}, {:?})",
            tracker.id(),
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            descriptor.format
        );
        Ok(Texture::new(tracker, descriptor.clone(), None, Arc::clone(&self.backend)))
    }

    /// Create a render target.
    pub fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
    ) -> Result<RenderTarget, GraphicsError> {
        let rejected = || RejectedDescriptor::RenderTarget(descriptor.clone());
        let texture = &descriptor.texture;
        check_texture_descriptor(texture)
            .map_err(|reason| GraphicsError::rejected(rejected(), reason))?;
        check_render_target(descriptor, self.capabilities())
            .map_err(|reason| GraphicsError::rejected(rejected(), reason))?;

        let handle = self
            .backend
            .create_texture(texture)
            .map_err(|err| self.creation_error(err, rejected()))?;
        let tracker = self.registry.register(
            ResourceKind::RenderTarget,
            texture.label.clone(),
            handle,
            texture.access,
        );
        log::trace!(
            "Device: created {:?} render target {} {:?} ({}x{}, {:?})",
            descriptor.role,
            tracker.id(),
            texture.label,
            texture.size.width,
            texture.size.height,
            texture.format
        );
        Ok(RenderTarget::new(Texture::new(
            tracker,
            texture.clone(),
            Some(descriptor.role),
            Arc::clone(&self.backend),
        )))
    }

    /// Create a shader. The code is passed through to the backend unparsed.
    pub fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<Shader, GraphicsError> {
        let rejected = || RejectedDescriptor::Shader(descriptor.clone());
        if descriptor.code.is_empty() {
            return Err(GraphicsError::rejected(rejected(), "shader code is empty"));
        }
        if descriptor.entry_point.is_empty() {
            return Err(GraphicsError::rejected(rejected(), "entry point is empty"));
        }

        let handle = self
            .backend
            .create_shader(descriptor)
            .map_err(|err| self.creation_error(err, rejected()))?;
        let tracker = self.registry.register(
            ResourceKind::Shader,
            descriptor.label.clone(),
            handle,
            Usage::Static,
        );
        log::trace!(
            "Device: created {} shader {} {:?}",
            descriptor.stage.name(),
            tracker.id(),
            descriptor.label
        );
        Ok(Shader::new(tracker, descriptor.clone()))
    }

    /// Create a pipeline, validating it against the backend's features.
    pub fn create_pipeline(&self, descriptor: &PipelineDescriptor) -> Result<Pipeline, GraphicsError> {
        if let Some((stage, _)) = descriptor
            .shaders()
            .find(|(_, shader)| shader.tracker().device() != self.id)
        {
            return Err(GraphicsError::mismatch(
                BindingSlot::Pipeline,
                format!("{} shader belongs to another device", stage.name()),
            ));
        }

        let kind = descriptor.validate(self.capabilities())?;
        self.backend.validate_pipeline(descriptor)?;

        let handle = self.backend.create_pipeline(descriptor)?;
        let tracker = self.registry.register(
            ResourceKind::Pipeline,
            descriptor.label.clone(),
            handle,
            Usage::Static,
        );
        log::trace!(
            "Device: created {kind:?} pipeline {} {:?}",
            tracker.id(),
            descriptor.label
        );
        Ok(Pipeline::new(tracker, descriptor.clone(), kind))
    }

    fn creation_error(&self, err: BackendError, descriptor: RejectedDescriptor) -> GraphicsError {
        match err {
            BackendError::DeviceLost(_) => err.into(),
            err => GraphicsError::rejected(descriptor, err.to_string()),
        }
    }

    // ========================================================================
    // Resource destruction
    // ========================================================================

    /// Destroy a buffer. Fails with `ResourceInUse` while an unretired
    /// command list references it.
    pub fn destroy_buffer(&self, buffer: &Buffer) -> Result<(), GraphicsError> {
        self.destroy(buffer.tracker())
    }

    pub fn destroy_texture(&self, texture: &Texture) -> Result<(), GraphicsError> {
        self.destroy(texture.tracker())
    }

    pub fn destroy_render_target(&self, target: &RenderTarget) -> Result<(), GraphicsError> {
        self.destroy(target.tracker())
    }

    /// Destroy a shader. Pipelines already linked from it stay valid.
    pub fn destroy_shader(&self, shader: &Shader) -> Result<(), GraphicsError> {
        self.destroy(shader.tracker())
    }

    pub fn destroy_pipeline(&self, pipeline: &Pipeline) -> Result<(), GraphicsError> {
        self.destroy(pipeline.tracker())
    }

    fn destroy(&self, tracker: &Arc<ResourceTracker>) -> Result<(), GraphicsError> {
        if tracker.device() != self.id {
            return Err(GraphicsError::missing(
                "destroy",
                format!("{} to be created by {}", tracker.id(), self.id),
            ));
        }
        tracker.mark_destroyed()?;
        self.registry.unregister(tracker.id());
        if let Err(err) = self.backend.destroy(tracker.handle()) {
            log::warn!("Device: backend failed to destroy {}: {err}", tracker.id());
        }
        log::trace!(
            "Device: destroyed {:?} {} {:?}",
            tracker.kind(),
            tracker.id(),
            tracker.label()
        );
        Ok(())
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// A command list in the Initial state, reusing pooled allocations.
    pub fn command_list(&self) -> CommandList {
        self.pool.acquire()
    }

    /// Queue an executable command list.
    ///
    /// Returns at once with the submission's fence. A rejected list is handed
    /// back inside the error.
    pub fn submit(&self, list: CommandList) -> Result<Submission, SubmitError> {
        if list.device() != self.id {
            let error = GraphicsError::missing("submit", format!("a command list created by {}", self.id));
            return Err(SubmitError { error, list });
        }
        self.queue.submit(list, false)
    }

    /// Submit a list whose retirement goes straight back to the pool.
    pub(crate) fn submit_transient(&self, list: CommandList) -> Result<Submission, SubmitError> {
        self.queue.submit(list, true)
    }

    /// Wait for `fence` to signal.
    ///
    /// Under [`CompletionMode::Manual`] another thread has to drive
    /// [`process`](Self::process), or the wait can only time out.
    pub fn wait(&self, fence: &Fence, timeout: impl Into<Timeout>) -> Result<WaitResult, GraphicsError> {
        fence.wait(timeout)
    }

    /// Wait for every submission made so far.
    pub fn wait_idle(&self, timeout: impl Into<Timeout>) -> Result<WaitResult, GraphicsError> {
        self.queue.wait_idle(timeout.into())
    }

    /// Execute up to `max` pending submissions on the calling thread.
    ///
    /// Returns how many ran. Under background completion the worker usually
    /// gets there first.
    pub fn process(&self, max: usize) -> usize {
        self.queue.process(max)
    }

    /// Run pending submissions here in manual mode.
    pub(crate) fn drive(&self) {
        if self.parameters.completion == CompletionMode::Manual {
            self.queue.process(usize::MAX);
        }
    }

    /// Take the retired command lists back for reuse.
    pub fn reclaim(&self) -> Vec<CommandList> {
        self.queue.reclaim()
    }

    /// Return a list to the pool. `false` if the pool is full or the list
    /// belongs to another device; the list is dropped then.
    pub fn recycle(&self, list: CommandList) -> bool {
        self.pool.release(list)
    }

    /// Number of pooled command lists.
    pub fn pooled_command_lists(&self) -> usize {
        self.pool.available()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Snapshot of every registered resource, in creation order.
    pub fn live_resources(&self) -> Vec<LiveResource> {
        self.registry.snapshot()
    }

    pub fn live_resource_count(&self) -> usize {
        self.registry.len()
    }

    /// Submissions that have not retired yet.
    pub fn outstanding_submissions(&self) -> u64 {
        self.queue.outstanding()
    }

    /// Whether a backend failure invalidated the device.
    pub fn is_lost(&self) -> bool {
        self.queue.lost().is_some() || self.backend.is_lost()
    }

    pub fn statistics(&self) -> QueueStatistics {
        self.queue.statistics()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stop the device.
    ///
    /// Fails with `ShutdownWhileBusy` while submissions are outstanding and
    /// hands the device back.
    pub fn shutdown(mut self) -> Result<(), ShutdownError> {
        let outstanding = self.queue.outstanding();
        if outstanding > 0 {
            return Err(ShutdownError {
                error: GraphicsError::ShutdownWhileBusy { outstanding },
                device: self,
            });
        }
        self.teardown();
        Ok(())
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(worker) = self.worker.take() {
            self.queue.stop();
            if worker.join().is_err() {
                log::error!("Device: queue worker of {} panicked", self.id);
            }
        }

        for tracker in self.registry.drain() {
            log::warn!(
                "Device: leaked {:?} {} {:?} at shutdown",
                tracker.kind(),
                tracker.id(),
                tracker.label()
            );
            if let Err(err) = self.backend.destroy(tracker.handle()) {
                log::debug!("Device: could not release {}: {err}", tracker.id());
            }
        }
        self.pool.clear();
        log::info!("Device: {} shut down", self.id);
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        let outstanding = self.queue.outstanding();
        if outstanding > 0 {
            log::error!(
                "Device: {} dropped with {outstanding} unretired submission(s), draining",
                self.id
            );
            if self.worker.is_none() {
                self.queue.process(usize::MAX);
            }
        }
        self.teardown();
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("label", &self.parameters.label)
            .field("backend", &self.backend.name())
            .field("completion", &self.parameters.completion)
            .field("live_resources", &self.registry.len())
            .field("outstanding", &self.queue.outstanding())
            .finish()
    }
}

static_assertions::assert_impl_all!(Device: Send, Sync);

fn check_texture_descriptor(descriptor: &TextureDescriptor) -> Result<(), &'static str> {
    let size = descriptor.size;
    if size.width == 0 || size.height == 0 || size.depth == 0 {
        return Err("texture has a zero dimension");
    }
    if descriptor.usage.is_empty() {
        return Err("texture has no usage");
    }
    if descriptor.mip_level_count == 0 {
        return Err("mip level count is zero");
    }
    let max_levels = 32 - size.width.max(size.height).leading_zeros();
    if descriptor.mip_level_count > max_levels {
        return Err("more mip levels than the size allows");
    }
    Ok(())
}

fn check_render_target(
    descriptor: &RenderTargetDescriptor,
    caps: &DeviceCapabilities,
) -> Result<(), &'static str> {
    let format = descriptor.texture.format;
    if !descriptor.texture.usage.contains(TextureUsage::RENDER_TARGET) {
        return Err("render target lacks RENDER_TARGET usage");
    }
    match descriptor.role {
        AttachmentRole::Color(_) if format.is_depth_stencil() => {
            Err("color target has a depth/stencil format")
        }
        AttachmentRole::Color(slot) if slot >= caps.max_color_attachments => {
            Err("color slot exceeds the device's color attachment limit")
        }
        AttachmentRole::DepthStencil if !format.is_depth_stencil() => {
            Err("depth/stencil target has a color format")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureFormat, TextureUsage};

    fn manual() -> Device {
        Device::new(DeviceParameters::default().with_completion(CompletionMode::Manual)).unwrap()
    }

    #[test]
    fn test_device_ids_are_unique() {
        let a = manual();
        let b = manual();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_zero_sized_buffer_is_rejected() {
        let device = manual();
        let err = device
            .create_buffer(&BufferDescriptor::constant(0))
            .unwrap_err();
        assert!(matches!(err, GraphicsError::ResourceCreation { .. }));
        assert_eq!(device.live_resource_count(), 0);
    }

    #[test]
    fn test_render_target_role_must_match_format() {
        let device = manual();
        let descriptor = RenderTargetDescriptor::color(4, 4, TextureFormat::Depth24PlusStencil8, 0);
        assert!(matches!(
            device.create_render_target(&descriptor),
            Err(GraphicsError::ResourceCreation { .. })
        ));

        let descriptor = RenderTargetDescriptor::depth_stencil(4, 4, TextureFormat::Rgba8Unorm);
        assert!(matches!(
            device.create_render_target(&descriptor),
            Err(GraphicsError::ResourceCreation { .. })
        ));
    }

    #[test]
    fn test_texture_mip_count_is_bounded() {
        let descriptor =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        assert!(check_texture_descriptor(&descriptor.clone().with_mip_levels(3)).is_ok());
        assert!(check_texture_descriptor(&descriptor.with_mip_levels(4)).is_err());
    }

    #[test]
    fn test_resources_of_other_devices_are_refused() {
        let a = manual();
        let b = manual();
        let buffer = a.create_buffer(&BufferDescriptor::constant(16)).unwrap();
        assert!(matches!(
            b.destroy_buffer(&buffer),
            Err(GraphicsError::MissingState { .. })
        ));
        assert!(a.destroy_buffer(&buffer).is_ok());

        let mut list = b.command_list();
        list.begin().unwrap();
        list.end().unwrap();
        let err = a.submit(list).unwrap_err();
        assert!(matches!(err.error, GraphicsError::MissingState { .. }));
    }

    #[test]
    fn test_drop_drains_manual_queue() {
        let device = manual();
        let mut list = device.command_list();
        list.begin().unwrap();
        list.end().unwrap();
        let submission = device.submit(list).unwrap();
        drop(device);
        assert!(submission.fence().is_signaled());
    }
}
