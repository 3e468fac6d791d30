use mgpu_ssao::queue::{create_device_pair, GpuDevice};
use mgpu_ssao::*;

fn prime_device() -> GpuDevice {
    let factory = Factory::new().expect("Cannot create factory");
    create_device_pair(&factory).expect("Cannot create devices").0
}

fn texture(gpu: &GpuDevice, name: &str) -> Resource {
    let texture = gpu
        .device()
        .create_committed_resource(
            &HeapProperties::default(),
            HeapFlags::None,
            &ResourceDesc::texture_2d(8, 8, DxgiFormat::R8G8B8A8_UNorm)
                .set_flags(ResourceFlags::AllowRenderTarget),
            ResourceStates::Common,
            None,
        )
        .expect("Cannot create texture");
    texture.set_name(name).expect("Cannot name texture");
    texture
}

fn execute(gpu: &GpuDevice, list: &mut CommandList) {
    gpu.queue()
        .execute_command_list(list)
        .expect("Cannot execute list");
    gpu.flush().expect("Cannot flush");
}

#[test]
fn adapters_are_ordered_by_memory() {
    let factory = Factory::new().expect("Cannot create factory");
    let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
    assert_ne!(prime.name(), second.name());
    assert!(
        prime.device().adapter_desc().dedicated_video_memory
            >= second.device().adapter_desc().dedicated_video_memory
    );
}

#[test]
fn copy_from_a_render_target_is_reported() {
    let gpu = prime_device();
    let source = texture(&gpu, "Source");
    let dest = texture(&gpu, "Destination");
    let info_queue = gpu.info_queue();

    let mut list = gpu.queue().get_command_list().expect("Cannot create list");
    list.transition_barrier(&source, ResourceStates::RenderTarget);
    list.flush_resource_barriers();
    list.copy_resource(&dest, &source);
    execute(&gpu, &mut list);

    assert_eq!(info_queue.count_at_or_above(MessageSeverity::Error), 1);
    let messages = info_queue.get_messages();
    assert!(
        messages[0].description.contains("copy source"),
        "{}",
        messages[0]
    );
    info_queue.clear_stored_messages();
    assert_eq!(info_queue.get_num_stored_messages(), 0);
}

#[test]
fn barrier_with_a_stale_before_state_is_reported() {
    let gpu = prime_device();
    let resource = texture(&gpu, "Stale barrier target");
    let info_queue = gpu.info_queue();

    let mut list = gpu.queue().get_command_list().expect("Cannot create list");
    list.resource_barrier(&[ResourceBarrier::transition(
        &ResourceTransitionBarrier::default()
            .set_resource(&resource)
            .set_state_before(ResourceStates::CopyDest)
            .set_state_after(ResourceStates::CopySource),
    )]);
    execute(&gpu, &mut list);

    assert_eq!(info_queue.count_at_or_above(MessageSeverity::Error), 1);
    assert_eq!(resource.state(), ResourceStates::CopySource);
}

#[test]
fn transition_without_a_resource_is_reported() {
    let gpu = prime_device();
    let info_queue = gpu.info_queue();

    let mut list = gpu.queue().get_command_list().expect("Cannot create list");
    list.resource_barrier(&[ResourceBarrier::transition(
        &ResourceTransitionBarrier::default().set_state_after(ResourceStates::RenderTarget),
    )]);
    execute(&gpu, &mut list);

    assert_eq!(info_queue.count_at_or_above(MessageSeverity::Error), 1);
    assert!(info_queue.get_messages()[0]
        .description
        .contains("without a resource"));
}

#[test]
fn clean_frames_leave_no_messages() {
    let gpu = prime_device();
    let resource = texture(&gpu, "Clean target");
    let rtv_heap = gpu
        .device()
        .create_descriptor_heap(
            &DescriptorHeapDesc::default()
                .set_type(DescriptorHeapType::RTV)
                .set_num_descriptors(Elements(1)),
        )
        .expect("Cannot create RTV heap");
    let rtv = rtv_heap.get_cpu_descriptor_handle_for_heap_start();
    gpu.device()
        .create_render_target_view(&resource, None, rtv)
        .expect("Cannot create RTV");

    let mut list = gpu.queue().get_command_list().expect("Cannot create list");
    list.transition_barrier(&resource, ResourceStates::RenderTarget);
    list.flush_resource_barriers();
    list.clear_render_target_view(rtv, [0.5, 0.25, 1., 1.]);
    execute(&gpu, &mut list);

    assert_eq!(gpu.info_queue().get_num_stored_messages(), 0);
    let view = gpu.read_texture(&resource).expect("Cannot read texture");
    let texel = view.load(3, 3);
    assert!((texel[0] - 0.5).abs() < 1. / 255.);
    assert!((texel[1] - 0.25).abs() < 1. / 255.);
}

#[test]
fn heaps_are_charged_to_the_adapter_budget() {
    let gpu = prime_device();
    let before = gpu.device().memory_usage();
    let heap = gpu
        .device()
        .create_heap(
            &HeapDesc::default()
                .set_size_in_bytes(DEFAULT_RESOURCE_ALIGNMENT)
                .set_properties(&HeapProperties::default())
                .set_alignment(DEFAULT_RESOURCE_ALIGNMENT),
        )
        .expect("Cannot create heap");
    assert_eq!(
        gpu.device().memory_usage().0,
        before.0 + DEFAULT_RESOURCE_ALIGNMENT.0
    );
    drop(heap);
    assert_eq!(gpu.device().memory_usage(), before);
}

#[test]
fn misaligned_placement_is_rejected() {
    let gpu = prime_device();
    let heap = gpu
        .device()
        .create_heap(
            &HeapDesc::default()
                .set_size_in_bytes(Bytes(4 * DEFAULT_RESOURCE_ALIGNMENT.0))
                .set_properties(&HeapProperties::default())
                .set_alignment(DEFAULT_RESOURCE_ALIGNMENT),
        )
        .expect("Cannot create heap");
    let error = gpu
        .device()
        .create_placed_resource(
            &heap,
            Bytes(256),
            &ResourceDesc::texture_2d(8, 8, DxgiFormat::R8G8B8A8_UNorm),
            ResourceStates::Common,
            None,
        )
        .expect_err("Misaligned placement succeeded");
    assert_eq!(error.code(), E_INVALIDARG);
}

#[test]
fn cross_adapter_textures_need_a_shared_heap() {
    let gpu = prime_device();
    let result = gpu.device().create_committed_resource(
        &HeapProperties::default(),
        HeapFlags::None,
        &ResourceDesc::texture_2d(8, 8, DxgiFormat::R8G8B8A8_UNorm)
            .set_flags(ResourceFlags::AllowCrossAdapter)
            .set_layout(TextureLayout::RowMajor),
        ResourceStates::Common,
        None,
    );
    assert!(result.is_err());
}

#[test]
fn constant_buffer_views_must_be_aligned() {
    let gpu = prime_device();
    let buffer = gpu
        .device()
        .create_committed_resource(
            &HeapProperties::default().set_type(HeapType::Upload),
            HeapFlags::None,
            &ResourceDesc::buffer(CONSTANT_BUFFER_ALIGNMENT),
            ResourceStates::GenericRead,
            None,
        )
        .expect("Cannot create buffer");
    let heap = gpu
        .device()
        .create_descriptor_heap(
            &DescriptorHeapDesc::default()
                .set_type(DescriptorHeapType::CBV_SRV_UAV)
                .set_num_descriptors(Elements(1)),
        )
        .expect("Cannot create descriptor heap");
    let handle = heap.get_cpu_descriptor_handle_for_heap_start();

    gpu.device()
        .create_constant_buffer_view(
            &ConstantBufferViewDesc::new(&buffer, CONSTANT_BUFFER_ALIGNMENT),
            handle,
        )
        .expect("Cannot create aligned view");
    let error = gpu
        .device()
        .create_constant_buffer_view(&ConstantBufferViewDesc::new(&buffer, Bytes(100)), handle)
        .expect_err("Unaligned view succeeded");
    assert_eq!(error.code(), E_INVALIDARG);
}
