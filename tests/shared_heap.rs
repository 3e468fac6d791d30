use mgpu_ssao::cross_adapter::SharedHeapResource;
use mgpu_ssao::queue::{create_device_pair, GpuDevice};
use mgpu_ssao::*;

fn devices() -> (GpuDevice, GpuDevice) {
    let factory = Factory::new().expect("Cannot create factory");
    create_device_pair(&factory).expect("Cannot create devices")
}

fn shared_map(
    prime: &GpuDevice,
    second: &GpuDevice,
    width: u32,
    height: u32,
) -> SharedHeapResource {
    SharedHeapResource::create(
        &ResourceDesc::texture_2d(width, height, DxgiFormat::R8G8B8A8_UNorm)
            .set_flags(ResourceFlags::AllowRenderTarget),
        prime,
        second,
        "Test shared map",
        ResourceFlags::None,
    )
    .expect("Cannot create shared heap resource")
}

/// Uploads `texels` into `texture` through the prime device's queue
fn upload_texture(gpu: &GpuDevice, texture: &Resource, texels: &[u8]) {
    let device = gpu.device();
    let desc = texture.get_desc();
    let (footprints, num_rows, row_sizes, total_bytes) = device
        .get_copyable_footprints(&desc, 0, 1, Bytes(0))
        .expect("Cannot get footprints");
    let upload = device
        .create_committed_resource(
            &HeapProperties::default().set_type(HeapType::Upload),
            HeapFlags::None,
            &ResourceDesc::buffer(total_bytes),
            ResourceStates::GenericRead,
            None,
        )
        .expect("Cannot create upload buffer");
    let row_pitch = u64::from(footprints[0].footprint().row_pitch());
    let row_size = row_sizes[0].0 as usize;
    for row in 0..num_rows[0] as usize {
        upload
            .write_data(
                Bytes(footprints[0].offset() + row as u64 * row_pitch),
                &texels[row * row_size..(row + 1) * row_size],
            )
            .expect("Cannot write upload buffer");
    }

    let mut list = gpu.queue().get_command_list().expect("Cannot create list");
    list.copy_texture_region(
        TextureCopyLocation::new_subresource_index(texture, 0),
        TextureCopyLocation::new_placed_footprint(&upload, footprints[0]),
    );
    gpu.queue()
        .execute_command_list(&mut list)
        .expect("Cannot execute list");
    gpu.flush().expect("Cannot flush");
}

#[test]
fn both_views_describe_the_same_texture() {
    let (prime, second) = devices();
    let map = shared_map(&prime, &second, 40, 30);
    let prime_view = map.prime_resource().expect("No prime view");
    let shared_view = map.shared_resource().expect("No shared view");
    let (prime_desc, shared_desc) = (prime_view.get_desc(), shared_view.get_desc());
    assert_eq!(prime_view.offset_in_heap(), shared_view.offset_in_heap());

    assert_eq!(prime_desc.width(), shared_desc.width());
    assert_eq!(prime_desc.height(), shared_desc.height());
    assert_eq!(prime_desc.format(), shared_desc.format());
    assert_eq!(shared_desc.layout(), TextureLayout::RowMajor);
    assert!(shared_desc.flags().contains(ResourceFlags::AllowCrossAdapter));
    // Render target use is not carried across adapters
    assert!(!shared_desc.flags().contains(ResourceFlags::AllowRenderTarget));
}

#[test]
fn data_written_on_prime_is_visible_on_second() {
    let (prime, second) = devices();
    let (width, height) = (16, 8);
    let map = shared_map(&prime, &second, width, height);

    let texels: Vec<u8> = (0..width * height)
        .flat_map(|index| {
            let (x, y) = ((index % width) as u8, (index / width) as u8);
            vec![x * 16, y * 32, 128, 255]
        })
        .collect();
    upload_texture(&prime, map.prime_resource().expect("No prime view"), &texels);

    let view = second
        .read_texture(map.shared_resource().expect("No shared view"))
        .expect("Cannot read shared view");
    for y in 0..height {
        for x in 0..width {
            let texel = view.load(x as i32, y as i32);
            assert!((texel[0] - (x * 16) as f32 / 255.).abs() < 1e-6);
            assert!((texel[1] - (y * 32) as f32 / 255.).abs() < 1e-6);
        }
    }
}

#[test]
fn shrinking_reuses_the_heap() {
    let (prime, second) = devices();
    let mut map = shared_map(&prime, &second, 256, 256);
    let heap_id = map.prime_heap().allocation_id();
    let heap_size = map.heap_size();

    map.resize(128, 64).expect("Cannot shrink");
    assert!(map.is_initialized());
    assert_eq!(map.prime_heap().allocation_id(), heap_id);
    assert_eq!(map.heap_size(), heap_size);
    assert_eq!(
        map.shared_resource().expect("No shared view").get_desc().width(),
        128
    );
}

#[test]
fn growing_reallocates_the_heap() {
    let (prime, second) = devices();
    let mut map = shared_map(&prime, &second, 64, 64);
    let heap_id = map.prime_heap().allocation_id();
    let heap_size = map.heap_size();

    map.resize(512, 512).expect("Cannot grow");
    assert_ne!(map.prime_heap().allocation_id(), heap_id);
    assert!(map.heap_size() > heap_size);
    assert_eq!(
        map.prime_heap().allocation_id(),
        map.second_heap().allocation_id()
    );
}

#[test]
fn oversized_heap_reports_out_of_memory() {
    let (prime, second) = devices();
    let result = SharedHeapResource::create(
        &ResourceDesc::texture_2d(16384, 16384, DxgiFormat::R32G32B32A32_Float),
        &prime,
        &second,
        "Oversized map",
        ResourceFlags::None,
    );
    match result {
        Err(error) => assert_eq!(error.code(), E_OUTOFMEMORY),
        Ok(_) => panic!("A 4 GiB heap fit into the adapter budget"),
    }
}
