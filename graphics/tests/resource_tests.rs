//! Resource lifetime and CPU access tests, run against both backends.

mod common;

use std::thread;
use std::time::Duration;

use common::{Backend, TestContext};
use rstest::rstest;
use tessera_graphics::{
    BufferDescriptor, Color, GraphicsError, RejectedDescriptor, ResourceKind, TextureDescriptor,
    TextureFormat, TextureUsage, Usage,
};

// ============================================================================
// Creation and registry
// ============================================================================

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_registry_tracks_creation_and_destruction(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let uniforms = ctx.constant_buffer(64, Usage::Dynamic);
    let target = ctx.color_target(4, 4);
    assert_eq!(ctx.device.live_resource_count(), 2);

    let live = ctx.device.live_resources();
    assert_eq!(live[0].id, uniforms.id());
    assert_eq!(live[0].kind, ResourceKind::Buffer);
    assert_eq!(live[1].kind, ResourceKind::RenderTarget);
    assert!(live.iter().all(|entry| entry.references == 0));

    ctx.device.destroy_buffer(&uniforms).unwrap();
    assert!(uniforms.is_destroyed());
    assert_eq!(ctx.device.live_resource_count(), 1);
    assert_eq!(
        ctx.device.destroy_buffer(&uniforms),
        Err(GraphicsError::ResourceDestroyed { id: uniforms.id() })
    );

    ctx.device.destroy_render_target(&target).unwrap();
    assert_eq!(ctx.device.live_resource_count(), 0);
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_invalid_descriptors_are_rejected(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);

    let err = ctx
        .device
        .create_buffer(&BufferDescriptor::vertex(3, 0))
        .unwrap_err();
    assert!(matches!(err, GraphicsError::ResourceCreation { .. }));

    let err = ctx
        .device
        .create_texture(&TextureDescriptor::new_2d(
            0,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED,
        ))
        .unwrap_err();
    assert!(matches!(err, GraphicsError::ResourceCreation { .. }));
    assert_eq!(ctx.device.live_resource_count(), 0);
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_oversized_descriptors_are_rejected(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let limit = ctx.device.capabilities().max_buffer_size;

    let oversized = BufferDescriptor::constant(u64::MAX / 2);
    match ctx.device.create_buffer(&oversized) {
        Err(GraphicsError::ResourceCreation { descriptor, .. }) => {
            assert_eq!(*descriptor, RejectedDescriptor::Buffer(oversized));
        }
        other => panic!("expected ResourceCreation, got {other:?}"),
    }
    assert!(matches!(
        ctx.device.create_buffer(&BufferDescriptor::constant(limit + 16)),
        Err(GraphicsError::ResourceCreation { .. })
    ));

    let dimension = ctx.device.capabilities().max_texture_dimension;
    let volume = TextureDescriptor::new_2d(
        dimension,
        dimension,
        TextureFormat::Rgba8Unorm,
        TextureUsage::SAMPLED,
    )
    .with_depth(dimension);
    assert!(matches!(
        ctx.device.create_texture(&volume),
        Err(GraphicsError::ResourceCreation { .. })
    ));
    assert_eq!(ctx.device.live_resource_count(), 0);
}

#[rstest]
#[case::explicit(Backend::Explicit, true)]
#[case::state_machine(Backend::StateMachine, false)]
fn test_float_render_target_support(#[case] backend: Backend, #[case] supported: bool) {
    let ctx = TestContext::new(backend);
    let result = ctx.device.create_render_target(
        &tessera_graphics::RenderTargetDescriptor::color(8, 8, TextureFormat::Rgba32Float, 0),
    );
    assert_eq!(result.is_ok(), supported);
    if let Err(err) = result {
        assert!(matches!(err, GraphicsError::ResourceCreation { .. }));
    }
}

// ============================================================================
// Destruction while referenced
// ============================================================================

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_destroy_waits_for_retirement(#[case] backend: Backend) {
    let ctx = TestContext::manual(backend);
    let pipeline = ctx.simple_pipeline();
    let vertices = ctx.vertex_buffer(3);
    let uniforms = ctx.constant_buffer(64, Usage::Static);

    let submission = ctx.submit_draw(&pipeline, &vertices, &uniforms);
    assert_eq!(
        ctx.device.destroy_buffer(&uniforms),
        Err(GraphicsError::ResourceInUse {
            id: uniforms.id(),
            references: 1
        })
    );
    assert!(ctx.device.destroy_pipeline(&pipeline).is_err());

    assert_eq!(ctx.device.process(usize::MAX), 1);
    assert!(submission.fence().is_signaled());
    ctx.device.destroy_buffer(&uniforms).unwrap();
    ctx.device.destroy_pipeline(&pipeline).unwrap();
    ctx.device.destroy_buffer(&vertices).unwrap();
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_recording_a_destroyed_resource_fails(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let pipeline = ctx.simple_pipeline();
    let uniforms = ctx.constant_buffer(64, Usage::Static);
    ctx.device.destroy_buffer(&uniforms).unwrap();

    let mut list = ctx.device.command_list();
    list.begin().unwrap();
    list.bind_pipeline(&pipeline).unwrap();
    assert_eq!(
        list.bind_buffer(0, &uniforms),
        Err(GraphicsError::ResourceDestroyed { id: uniforms.id() })
    );
}

// ============================================================================
// CPU access
// ============================================================================

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_buffer_contents_round_trip(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let uniforms = ctx.constant_buffer(16, Usage::Dynamic);
    {
        let mut mapped = uniforms.lock::<f32>(0, 4).unwrap();
        mapped.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
    }
    uniforms.update(4, &7.5f32.to_ne_bytes()).unwrap();

    let values = uniforms.read::<f32>(0, 4).unwrap();
    assert_eq!(&*values, &[1.0, 7.5, 3.0, 4.0]);
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_mapping_out_of_bounds_fails(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let uniforms = ctx.constant_buffer(16, Usage::Dynamic);
    assert!(matches!(
        uniforms.lock::<f32>(2, 4),
        Err(GraphicsError::OutOfBounds { .. })
    ));
    assert!(matches!(
        uniforms.update(12, &[0; 8]),
        Err(GraphicsError::OutOfBounds { .. })
    ));
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_mapped_buffer_cannot_be_recorded_or_mapped_twice(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let pipeline = ctx.simple_pipeline();
    let uniforms = ctx.constant_buffer(16, Usage::Dynamic);

    let guard = uniforms.map_write().unwrap();
    assert_eq!(
        uniforms.map_read().map(|_| ()),
        Err(GraphicsError::ResourceMapped { id: uniforms.id() })
    );

    let mut list = ctx.device.command_list();
    list.begin().unwrap();
    list.bind_pipeline(&pipeline).unwrap();
    assert_eq!(
        list.bind_buffer(0, &uniforms),
        Err(GraphicsError::ResourceMapped { id: uniforms.id() })
    );

    drop(guard);
    list.bind_buffer(0, &uniforms).unwrap();
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_static_buffer_in_flight_refuses_mapping(#[case] backend: Backend) {
    let ctx = TestContext::manual(backend);
    let pipeline = ctx.simple_pipeline();
    let vertices = ctx.vertex_buffer(3);
    let uniforms = ctx.constant_buffer(64, Usage::Static);

    ctx.submit_draw(&pipeline, &vertices, &uniforms);
    assert!(matches!(
        uniforms.map_write().map(|_| ()),
        Err(GraphicsError::ResourceInUse { .. })
    ));

    ctx.device.process(usize::MAX);
    assert!(uniforms.map_write().is_ok());
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_dynamic_buffer_in_flight_blocks_mapping(#[case] backend: Backend) {
    let ctx = TestContext::manual(backend);
    let pipeline = ctx.simple_pipeline();
    let vertices = ctx.vertex_buffer(3);
    let uniforms = ctx.constant_buffer(64, Usage::Dynamic);

    let submission = ctx.submit_draw(&pipeline, &vertices, &uniforms);
    thread::scope(|scope| {
        let mapper = scope.spawn(|| {
            let mut mapped = uniforms.map_write().unwrap();
            mapped[0] = 0xAB;
            submission.fence().is_signaled()
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!mapper.is_finished());
        ctx.device.process(usize::MAX);
        assert!(mapper.join().unwrap());
    });
    assert_eq!(uniforms.map_read().unwrap()[0], 0xAB);
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_render_target_readback(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let target = ctx.color_target(2, 2);

    let submission = ctx.submit_clear(&target, Color::new(1.0, 0.0, 0.0, 1.0));
    ctx.wait(&submission);

    let pixels = target.texture().read(0).unwrap();
    assert_eq!(pixels.len(), 2 * 2 * 4);
    assert!(pixels.chunks(4).all(|pixel| pixel == [255, 0, 0, 255]));
}

#[rstest]
#[case::explicit(Backend::Explicit)]
#[case::state_machine(Backend::StateMachine)]
fn test_texture_update_replaces_level(#[case] backend: Backend) {
    let ctx = TestContext::new(backend);
    let texture = ctx
        .device
        .create_texture(&TextureDescriptor::new_2d(
            2,
            1,
            TextureFormat::Rgba8Unorm,
            TextureUsage::SAMPLED | TextureUsage::READBACK,
        ))
        .unwrap();

    let data = [1, 2, 3, 4, 5, 6, 7, 8];
    texture.update(0, &data).unwrap();
    assert_eq!(texture.read(0).unwrap(), data);
    assert!(matches!(
        texture.update(0, &data[..4]),
        Err(GraphicsError::OutOfBounds { .. })
    ));
}
