use mgpu_ssao::ao_resources::{
    AoResourceSet, SsaoResources, NORMAL_MAP_CLEAR, OFFSET_VECTOR_COUNT,
};
use mgpu_ssao::config::{AoConfig, AoMode, AoTechnique};
use mgpu_ssao::frame_resource::UploadBuffer;
use mgpu_ssao::math::Camera;
use mgpu_ssao::orchestrator::{DualGpuFrameOrchestrator, FrameOutcome};
use mgpu_ssao::queue::{create_device_pair, GpuDevice};
use mgpu_ssao::scene::SceneKind;
use mgpu_ssao::ssao::{SharedSsao, SsaoConstants};
use mgpu_ssao::*;

const NO_OFFSETS: [[f32; 4]; OFFSET_VECTOR_COUNT] = [[0.; 4]; OFFSET_VECTOR_COUNT];

fn devices() -> (GpuDevice, GpuDevice) {
    let factory = Factory::new().expect("Cannot create factory");
    create_device_pair(&factory).expect("Cannot create devices")
}

fn flat_orchestrator(config: AoConfig) -> DualGpuFrameOrchestrator {
    let (prime, second) = devices();
    let mut orchestrator = DualGpuFrameOrchestrator::with_scene(
        config,
        prime,
        second,
        SceneKind::Flat { depth: 0.5 },
    )
    .expect("Cannot create orchestrator");
    orchestrator.set_offset_vectors(NO_OFFSETS);
    orchestrator
}

fn assert_unoccluded(orchestrator: &mut DualGpuFrameOrchestrator) {
    let ambient = orchestrator
        .read_ambient_map()
        .expect("Cannot read the ambient map");
    assert_eq!(ambient.width(), orchestrator.config().width);
    assert_eq!(ambient.height(), orchestrator.config().height);
    for (index, texel) in ambient.texels().iter().enumerate() {
        assert_eq!(texel[0], 1., "texel {} is occluded", index);
    }
}

#[test]
fn flat_surface_through_shared_heap_is_unoccluded() {
    let mut orchestrator = flat_orchestrator(
        AoConfig::default()
            .set_size(64, 64)
            .set_mode(AoMode::Shared),
    );
    assert_eq!(
        orchestrator.render_frame().expect("Cannot render frame"),
        FrameOutcome::Shared
    );
    assert_unoccluded(&mut orchestrator);
}

#[test]
fn flat_surface_rendered_natively_is_unoccluded() {
    let mut orchestrator = flat_orchestrator(
        AoConfig::default()
            .set_size(48, 32)
            .set_mode(AoMode::Native),
    );
    orchestrator.render_frame().expect("Cannot render frame");
    assert_unoccluded(&mut orchestrator);
}

#[test]
fn flat_surface_with_hbao_is_unoccluded() {
    let mut orchestrator = flat_orchestrator(
        AoConfig::default()
            .set_size(40, 40)
            .set_technique(AoTechnique::Hbao)
            .set_mode(AoMode::Shared),
    );
    orchestrator.render_frame().expect("Cannot render frame");
    assert_unoccluded(&mut orchestrator);
}

#[test]
fn procedural_scene_stays_in_range_after_resize() {
    let (prime, second) = devices();
    let mut orchestrator = DualGpuFrameOrchestrator::new(
        AoConfig::default()
            .set_size(48, 27)
            .set_mode(AoMode::Shared),
        prime,
        second,
    )
    .expect("Cannot create orchestrator");
    orchestrator.render_frame().expect("Cannot render frame");
    orchestrator.resize(64, 36).expect("Cannot resize");
    orchestrator.render_frame().expect("Cannot render after resize");

    let ambient = orchestrator
        .read_ambient_map()
        .expect("Cannot read the ambient map");
    assert_eq!((ambient.width(), ambient.height()), (64, 36));
    assert!(ambient
        .texels()
        .iter()
        .all(|texel| texel[0] >= 0. && texel[0] <= 1.));

    let back_buffer = orchestrator
        .read_back_buffer()
        .expect("Cannot read the back buffer");
    assert_eq!(back_buffer.width(), 64);
    assert!(back_buffer.texels().iter().any(|texel| texel[0] > 0.));
}

/// Fills fresh SSAO maps with a flat surface and an ambient value of
/// `ambient`, then blurs `blur_count` times
fn blur_uniform_map(blur_count: u32, ambient: f32) -> Vec<[f32; 4]> {
    let (prime, _second) = devices();
    let (width, height) = (16, 16);
    let mut resources = SsaoResources::new();
    resources
        .initialize(&prime, &InputLayoutDesc::default())
        .expect("Cannot initialize SSAO resources");
    resources
        .on_resize(width, height)
        .expect("Cannot size SSAO resources");

    let constants: UploadBuffer<SsaoConstants> =
        UploadBuffer::new(prime.device(), 1, "Blur constants").expect("Cannot create constants");
    constants
        .copy_data(
            0,
            &SsaoConstants::new(
                &Camera::default().projection(),
                width,
                height,
                &AoConfig::default(),
                &NO_OFFSETS,
            )
            .expect("Cannot build constants"),
        )
        .expect("Cannot upload constants");

    let maps = resources.maps().expect("No maps");
    let views = resources.views().expect("No views");
    let mut list = prime.queue().get_command_list().expect("Cannot create list");
    list.transition_barrier(&maps.normal, ResourceStates::RenderTarget);
    list.transition_barrier(&maps.depth, ResourceStates::DepthWrite);
    list.transition_barrier(&maps.ambient[0], ResourceStates::RenderTarget);
    list.flush_resource_barriers();
    list.clear_render_target_view(views.normal_rtv, NORMAL_MAP_CLEAR);
    list.clear_depth_stencil_view(views.depth_dsv, ClearFlags::Depth, 0.5, 0);
    list.clear_render_target_view(views.ambient_rtv[0], [ambient; 4]);
    list.transition_barrier(&maps.normal, ResourceStates::PixelShaderResource);
    list.transition_barrier(&maps.depth, ResourceStates::PixelShaderResource);
    list.transition_barrier(&maps.ambient[0], ResourceStates::PixelShaderResource);
    list.flush_resource_barriers();

    SharedSsao::blur_ambient_map(&mut list, constants.gpu_address(0), &resources, blur_count)
        .expect("Cannot record blur");
    prime
        .queue()
        .execute_command_list(&mut list)
        .expect("Cannot execute blur");
    prime.flush().expect("Cannot flush");

    prime
        .read_texture(&maps.ambient[0])
        .expect("Cannot read the ambient map")
        .texels()
        .to_vec()
}

#[test]
fn zero_blur_leaves_the_map_untouched() {
    let texels = blur_uniform_map(0, 0.25);
    let cleared = texels[0][0];
    assert!((cleared - 0.25).abs() < 1e-4);
    assert!(texels.iter().all(|texel| texel[0].to_bits() == cleared.to_bits()));
}

#[test]
fn blur_keeps_a_uniform_map_uniform() {
    let texels = blur_uniform_map(2, 0.25);
    assert!(texels.iter().all(|texel| (texel[0] - 0.25).abs() < 1e-4));
}
