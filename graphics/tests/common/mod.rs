//! Common utilities for integration tests.
//!
//! This module provides shared test infrastructure that is reused across
//! both backend implementations.

#![allow(dead_code)]

use std::sync::Arc;

use tessera_graphics::{
    BackendKind, BindingLayoutEntry, Buffer, BufferDescriptor, ColorAttachment, Color,
    CommandList, CompletionMode, Device, DeviceParameters, IndexFormat, Pipeline,
    PipelineDescriptor, RenderPassDescriptor, RenderTarget, RenderTargetDescriptor, Shader,
    ShaderCode, ShaderDescriptor, ShaderStage, ShaderStages, Submission, TextureFormat,
    TextureUsage, Timeout, Usage, VertexFormat, VertexLayout, WaitResult,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Backends under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Explicit,
    StateMachine,
}

impl Backend {
    pub fn kind(self) -> BackendKind {
        match self {
            Backend::Explicit => BackendKind::Explicit,
            Backend::StateMachine => BackendKind::StateMachine,
        }
    }

    pub fn to_parameters(self) -> DeviceParameters {
        DeviceParameters::new()
            .with_backend(self.kind())
            .with_label(format!("test-{}", self.kind()))
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A device plus helpers for the resources tests keep creating.
pub struct TestContext {
    pub backend: Backend,
    pub device: Arc<Device>,
}

impl TestContext {
    /// Device completing submissions on its queue worker.
    pub fn new(backend: Backend) -> Self {
        Self::with_parameters(backend, backend.to_parameters())
    }

    /// Device that completes nothing until `process` is called.
    pub fn manual(backend: Backend) -> Self {
        Self::with_parameters(
            backend,
            backend.to_parameters().with_completion(CompletionMode::Manual),
        )
    }

    pub fn with_parameters(backend: Backend, parameters: DeviceParameters) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let device = Device::new(parameters).expect("Failed to create device");
        Self {
            backend,
            device: Arc::new(device),
        }
    }

    pub fn constant_buffer(&self, size: u64, usage: Usage) -> Buffer {
        self.device
            .create_buffer(&BufferDescriptor::constant(size).with_usage(usage))
            .expect("Failed to create constant buffer")
    }

    /// Vertex buffer of `count` `Float3` positions.
    pub fn vertex_buffer(&self, count: u32) -> Buffer {
        self.device
            .create_buffer(&BufferDescriptor::vertex(count, 12).with_label("positions"))
            .expect("Failed to create vertex buffer")
    }

    pub fn index_buffer(&self, count: u32) -> Buffer {
        self.device
            .create_buffer(&BufferDescriptor::index(count, IndexFormat::Uint16))
            .expect("Failed to create index buffer")
    }

    pub fn color_target(&self, width: u32, height: u32) -> RenderTarget {
        self.device
            .create_render_target(
                &RenderTargetDescriptor::color(width, height, TextureFormat::Rgba8Unorm, 0)
                    .with_usage(TextureUsage::READBACK | TextureUsage::SAMPLED),
            )
            .expect("Failed to create render target")
    }

    /// Vertex shader reading `inputs` at locations `0..`, writing one `Float4`.
    pub fn vertex_shader(&self, inputs: &[VertexFormat]) -> Shader {
        let descriptor = inputs.iter().enumerate().fold(
            ShaderDescriptor::new(ShaderStage::Vertex, ShaderCode::Source("vs".into()))
                .with_output(0, VertexFormat::Float4),
            |descriptor, (location, format)| descriptor.with_input(location as u32, *format),
        );
        self.device
            .create_shader(&descriptor)
            .expect("Failed to create vertex shader")
    }

    /// Fragment shader reading `Float4` inputs at locations `0..inputs`.
    pub fn fragment_shader(&self, inputs: u32) -> Shader {
        let descriptor = (0..inputs).fold(
            ShaderDescriptor::new(ShaderStage::Fragment, ShaderCode::Source("fs".into())),
            |descriptor, location| descriptor.with_input(location, VertexFormat::Float4),
        );
        self.device
            .create_shader(&descriptor)
            .expect("Failed to create fragment shader")
    }

    /// Position-only pipeline with a constant buffer at slot 0 and a texture
    /// at slot 1.
    pub fn simple_pipeline(&self) -> Pipeline {
        let vs = self.vertex_shader(&[VertexFormat::Float3]);
        let fs = self.fragment_shader(1);
        let descriptor = PipelineDescriptor::graphics(&vs, &fs)
            .with_label("simple")
            .with_vertex_layout(VertexLayout::packed(&[VertexFormat::Float3]))
            .with_binding(BindingLayoutEntry::constant_buffer(0, ShaderStages::VERTEX))
            .with_binding(BindingLayoutEntry::texture(1, ShaderStages::FRAGMENT));
        self.device
            .create_pipeline(&descriptor)
            .expect("Failed to create pipeline")
    }

    /// An empty, executable command list.
    pub fn empty_list(&self) -> CommandList {
        let mut list = self.device.command_list();
        list.begin().unwrap();
        list.end().unwrap();
        list
    }

    /// Record and submit a list that clears `target` to `color`.
    pub fn submit_clear(&self, target: &RenderTarget, color: Color) -> Submission {
        let mut list = self.device.command_list();
        list.begin().unwrap();
        list.begin_render_pass(
            &RenderPassDescriptor::default().with_color(ColorAttachment::cleared(target, color)),
        )
        .unwrap();
        list.end_render_pass().unwrap();
        list.end().unwrap();
        self.device.submit(list).expect("Failed to submit")
    }

    /// Record a draw of `pipeline` with `vertices` bound, using `uniforms` at
    /// slot 0, and submit it.
    pub fn submit_draw(
        &self,
        pipeline: &Pipeline,
        vertices: &Buffer,
        uniforms: &Buffer,
    ) -> Submission {
        let mut list = self.device.command_list();
        list.begin().unwrap();
        list.begin_render_pass(&RenderPassDescriptor::default_framebuffer())
            .unwrap();
        list.bind_pipeline(pipeline).unwrap();
        list.bind_vertex_buffer(0, vertices, 0).unwrap();
        list.bind_buffer(0, uniforms).unwrap();
        list.draw(0..3, 0..1).unwrap();
        list.end_render_pass().unwrap();
        list.end().unwrap();
        self.device.submit(list).expect("Failed to submit")
    }

    pub fn wait(&self, submission: &Submission) {
        assert_eq!(
            self.device.wait(submission.fence(), Timeout::Infinite),
            Ok(WaitResult::Signaled)
        );
    }
}
