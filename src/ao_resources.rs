//! Per-device render targets, descriptors and pipelines of one ambient
//! occlusion pass.

use std::sync::Arc;

use log::{debug, trace};
use rand::Rng;

use crate::cross_adapter::CrossAdapterResourceSet;
use crate::error::{AoError, AoResult};
use crate::hbao::HbaoComputeShader;
use crate::queue::GpuDevice;
use crate::shader::PixelShader;
use crate::ssao::{SsaoBlurShader, SsaoPixelShader};
use crate::*;

pub const NORMAL_MAP_FORMAT: DxgiFormat = DxgiFormat::R16G16B16A16_Float;
pub const DEPTH_MAP_FORMAT: DxgiFormat = DxgiFormat::R32_Typeless;
pub const DEPTH_SRV_FORMAT: DxgiFormat = DxgiFormat::R32_Float;
pub const DEPTH_DSV_FORMAT: DxgiFormat = DxgiFormat::D32_Float;
pub const AMBIENT_MAP_FORMAT: DxgiFormat = DxgiFormat::R16_UNorm;
pub const RANDOM_MAP_FORMAT: DxgiFormat = DxgiFormat::R8G8B8A8_UNorm;
pub const RANDOM_MAP_SIZE: u32 = 256;

pub const NORMAL_MAP_CLEAR: [f32; 4] = [0., 0., 1., 0.];
pub const AMBIENT_MAP_CLEAR: [f32; 4] = [1., 1., 1., 1.];
pub const DEPTH_CLEAR: f32 = 1.;

pub const OFFSET_VECTOR_COUNT: usize = 14;

// Slots of the shader-visible heap
pub(crate) const NORMAL_SRV: u32 = 0;
const DEPTH_SRV: u32 = 1;
const RANDOM_SRV: u32 = 2;
pub(crate) const AMBIENT_SRV: u32 = 3;
const AMBIENT_UAV: u32 = 5;
const SRV_HEAP_SIZE: u32 = 6;

// Slots of the render target heap
const NORMAL_RTV: u32 = 0;
const AMBIENT_RTV: u32 = 1;
const RTV_HEAP_SIZE: u32 = 3;

/// Sample directions around a point: the 8 cube corners followed by the 6
/// face centres, each scaled to a random length in [0.25, 1]
pub fn build_offset_vectors<R: Rng>(rng: &mut R) -> [[f32; 4]; OFFSET_VECTOR_COUNT] {
    let mut directions = [[0f32; 4]; OFFSET_VECTOR_COUNT];
    let mut index = 0;
    for &z in &[1., -1.] {
        for &y in &[1., -1.] {
            for &x in &[1., -1.] {
                directions[index] = [x, y, z, 0.];
                index += 1;
            }
        }
    }
    for axis in 0..3 {
        for &sign in &[1., -1.] {
            directions[index][axis] = sign;
            index += 1;
        }
    }

    for direction in directions.iter_mut() {
        let length = (direction[0] * direction[0]
            + direction[1] * direction[1]
            + direction[2] * direction[2])
            .sqrt();
        let scale = rng.gen_range(0.25..=1.0) / length;
        for component in direction.iter_mut().take(3) {
            *component *= scale;
        }
    }
    directions
}

/// Which of the two devices a resource set lives on
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Prime,
    Second,
}

/// Viewport and scissor rect covering a whole render target
pub fn full_screen_viewport(width: u32, height: u32) -> (Viewport, Rect) {
    (
        Viewport::default()
            .set_width(width as f32)
            .set_height(height as f32)
            .set_max_depth(1.),
        Rect::default()
            .set_right(width as i32)
            .set_bottom(height as i32),
    )
}

/// Textures of one ambient occlusion pass
#[derive(Clone, Debug)]
pub struct AoMaps {
    pub normal: Resource,
    pub depth: Resource,
    pub random: Resource,
    /// Ping-pong pair; [0] holds the result after every pass
    pub ambient: [Resource; 2],
}

/// Descriptor handles into the set's heaps
#[derive(Clone, Debug)]
pub struct AoViews {
    pub srv_heap: DescriptorHeap,
    pub normal_srv: GpuDescriptorHandle,
    pub depth_srv: GpuDescriptorHandle,
    pub random_srv: GpuDescriptorHandle,
    pub ambient_srv: [GpuDescriptorHandle; 2],
    pub ambient_uav: Option<GpuDescriptorHandle>,
    pub normal_rtv: CpuDescriptorHandle,
    pub ambient_rtv: [CpuDescriptorHandle; 2],
    pub depth_dsv: CpuDescriptorHandle,
}

/// What every ambient occlusion technique needs from its per-device
/// resources
pub trait AoResourceSet {
    fn initialize(&mut self, gpu: &GpuDevice, input_layout: &InputLayoutDesc) -> AoResult<()>;

    /// Recreates the size-dependent maps. Returns whether anything was
    /// recreated.
    fn on_resize(&mut self, width: u32, height: u32) -> AoResult<bool>;

    fn root_signature(&self) -> AoResult<&RootSignature>;

    /// The occlusion pipeline
    fn pso(&self) -> AoResult<&PipelineState>;

    fn views(&self) -> AoResult<&AoViews>;

    fn maps(&self) -> AoResult<&AoMaps>;

    fn size(&self) -> (u32, u32);
}

fn static_samplers() -> [StaticSamplerDesc; 4] {
    [
        StaticSamplerDesc::default()
            .set_filter(Filter::MinMagMipPoint)
            .set_address_u(TextureAddressMode::Clamp)
            .set_address_v(TextureAddressMode::Clamp)
            .set_address_w(TextureAddressMode::Clamp)
            .set_shader_register(Elements(0)),
        StaticSamplerDesc::default()
            .set_filter(Filter::MinMagMipLinear)
            .set_address_u(TextureAddressMode::Clamp)
            .set_address_v(TextureAddressMode::Clamp)
            .set_address_w(TextureAddressMode::Clamp)
            .set_shader_register(Elements(1)),
        StaticSamplerDesc::default()
            .set_filter(Filter::MinMagMipLinear)
            .set_address_u(TextureAddressMode::Border)
            .set_address_v(TextureAddressMode::Border)
            .set_address_w(TextureAddressMode::Border)
            .set_comparison_func(ComparisonFunc::LessEqual)
            .set_border_color(StaticBorderColor::OpaqueWhite)
            .set_shader_register(Elements(2)),
        StaticSamplerDesc::default()
            .set_filter(Filter::MinMagMipLinear)
            .set_address_u(TextureAddressMode::Wrap)
            .set_address_v(TextureAddressMode::Wrap)
            .set_address_w(TextureAddressMode::Wrap)
            .set_shader_register(Elements(3)),
    ]
}

fn srv_table(base_register: u64, count: u64) -> RootDescriptorTable {
    RootDescriptorTable::default().set_descriptor_ranges(&[DescriptorRange::default()
        .set_range_type(DescriptorRangeType::Srv)
        .set_num_descriptors(Elements(count))
        .set_base_shader_register(Elements(base_register))])
}

fn create_random_vector_map(gpu: &GpuDevice) -> DxResult<Resource> {
    let device = gpu.device();
    let desc = ResourceDesc::texture_2d(RANDOM_MAP_SIZE, RANDOM_MAP_SIZE, RANDOM_MAP_FORMAT);
    let random_map = device.create_committed_resource(
        &HeapProperties::default(),
        HeapFlags::None,
        &desc,
        ResourceStates::CopyDest,
        None,
    )?;
    random_map.set_name("Random vector map")?;

    let (footprints, num_rows, row_sizes, total_bytes) =
        device.get_copyable_footprints(&desc, 0, 1, Bytes(0))?;
    let upload = device.create_committed_resource(
        &HeapProperties::default().set_type(HeapType::Upload),
        HeapFlags::None,
        &ResourceDesc::buffer(total_bytes),
        ResourceStates::GenericRead,
        None,
    )?;
    upload.set_name("Random vector map upload")?;

    let mut rng = rand::thread_rng();
    let row_pitch = u64::from(footprints[0].footprint().row_pitch());
    for row in 0..u64::from(num_rows[0]) {
        let texels: Vec<u8> = (0..row_sizes[0].0).map(|_| rng.gen()).collect();
        upload.write_data(Bytes(footprints[0].offset() + row * row_pitch), &texels)?;
    }

    let mut list = gpu.queue().get_command_list()?;
    list.copy_texture_region(
        TextureCopyLocation::new_subresource_index(&random_map, 0),
        TextureCopyLocation::new_placed_footprint(&upload, footprints[0]),
    );
    list.transition_barrier(&random_map, ResourceStates::AllShaderResource);
    list.flush_resource_barriers();
    gpu.queue().execute_command_list(&mut list)?;
    // The upload buffer has to outlive the copy
    gpu.queue().flush()?;

    Ok(random_map)
}

struct DescriptorHeaps {
    srv: DescriptorHeap,
    rtv: DescriptorHeap,
    dsv: DescriptorHeap,
}

/// State shared by the SSAO and HBAO resource sets
struct AoResourceCore {
    device: Option<Device>,
    heaps: Option<DescriptorHeaps>,
    random_map: Option<Resource>,
    maps: Option<AoMaps>,
    views: Option<AoViews>,
    width: u32,
    height: u32,
    unordered_access: bool,
    name: &'static str,
}

impl AoResourceCore {
    fn new(name: &'static str, unordered_access: bool) -> Self {
        Self {
            device: None,
            heaps: None,
            random_map: None,
            maps: None,
            views: None,
            width: 0,
            height: 0,
            unordered_access,
            name,
        }
    }

    fn initialize(&mut self, gpu: &GpuDevice) -> AoResult<()> {
        let device = gpu.device();
        let srv = device.create_descriptor_heap(
            &DescriptorHeapDesc::default()
                .set_type(DescriptorHeapType::CBV_SRV_UAV)
                .set_num_descriptors(Elements(u64::from(SRV_HEAP_SIZE)))
                .set_flags(DescriptorHeapFlags::ShaderVisible),
        )?;
        srv.set_name(&format!("{} SRV heap", self.name))?;
        let rtv = device.create_descriptor_heap(
            &DescriptorHeapDesc::default()
                .set_type(DescriptorHeapType::RTV)
                .set_num_descriptors(Elements(u64::from(RTV_HEAP_SIZE))),
        )?;
        rtv.set_name(&format!("{} RTV heap", self.name))?;
        let dsv = device.create_descriptor_heap(
            &DescriptorHeapDesc::default()
                .set_type(DescriptorHeapType::DSV)
                .set_num_descriptors(Elements(1)),
        )?;
        dsv.set_name(&format!("{} DSV heap", self.name))?;

        self.random_map = Some(create_random_vector_map(gpu)?);
        self.heaps = Some(DescriptorHeaps { srv, rtv, dsv });
        self.device = Some(device.clone());
        trace!("Initialized {} resources on '{}'", self.name, gpu.name());
        Ok(())
    }

    fn create_map(
        device: &Device,
        desc: &ResourceDesc,
        name: String,
    ) -> DxResult<Resource> {
        let resource = device.create_committed_resource(
            &HeapProperties::default(),
            HeapFlags::None,
            desc,
            ResourceStates::Common,
            None,
        )?;
        resource.set_name(&name)?;
        Ok(resource)
    }

    fn on_resize(&mut self, width: u32, height: u32) -> AoResult<bool> {
        if width == 0 || height == 0 {
            return Err(AoError::Config(format!(
                "cannot size {} maps to {}x{}",
                self.name, width, height
            )));
        }
        if self.maps.is_some() && self.width == width && self.height == height {
            return Ok(false);
        }
        let (device, random) = match (&self.device, &self.random_map) {
            (Some(device), Some(random)) => (device, random),
            _ => return Err(AoError::NotInitialized(self.name)),
        };

        let normal = Self::create_map(
            device,
            &ResourceDesc::texture_2d(width, height, NORMAL_MAP_FORMAT)
                .set_flags(ResourceFlags::AllowRenderTarget),
            format!("{} normal map", self.name),
        )?;
        let depth = Self::create_map(
            device,
            &ResourceDesc::texture_2d(width, height, DEPTH_MAP_FORMAT)
                .set_flags(ResourceFlags::AllowDepthStencil),
            format!("{} depth map", self.name),
        )?;
        let ambient_flags = if self.unordered_access {
            ResourceFlags::AllowRenderTarget | ResourceFlags::AllowUnorderedAccess
        } else {
            ResourceFlags::AllowRenderTarget
        };
        let ambient_desc =
            ResourceDesc::texture_2d(width, height, AMBIENT_MAP_FORMAT).set_flags(ambient_flags);
        let ambient = [
            Self::create_map(device, &ambient_desc, format!("{} ambient map 0", self.name))?,
            Self::create_map(device, &ambient_desc, format!("{} ambient map 1", self.name))?,
        ];

        self.maps = Some(AoMaps {
            normal,
            depth,
            random: random.clone(),
            ambient,
        });
        self.width = width;
        self.height = height;
        self.rebuild_descriptors()?;
        debug!("Resized {} maps to {}x{}", self.name, width, height);
        Ok(true)
    }

    fn rebuild_descriptors(&mut self) -> AoResult<()> {
        let (device, heaps, maps) = match (&self.device, &self.heaps, &self.maps) {
            (Some(device), Some(heaps), Some(maps)) => (device, heaps, maps),
            _ => return Err(AoError::NotInitialized(self.name)),
        };
        let srv_cpu = heaps.srv.get_cpu_descriptor_handle_for_heap_start();
        let srv_gpu = heaps.srv.get_gpu_descriptor_handle_for_heap_start();
        let rtv_cpu = heaps.rtv.get_cpu_descriptor_handle_for_heap_start();
        let dsv_cpu = heaps.dsv.get_cpu_descriptor_handle_for_heap_start();

        device.create_shader_resource_view(
            &maps.normal,
            Some(&ShaderResourceViewDesc::default().set_format(NORMAL_MAP_FORMAT)),
            srv_cpu.advance(NORMAL_SRV),
        )?;
        device.create_shader_resource_view(
            &maps.depth,
            Some(&ShaderResourceViewDesc::default().set_format(DEPTH_SRV_FORMAT)),
            srv_cpu.advance(DEPTH_SRV),
        )?;
        device.create_shader_resource_view(
            &maps.random,
            Some(&ShaderResourceViewDesc::default().set_format(RANDOM_MAP_FORMAT)),
            srv_cpu.advance(RANDOM_SRV),
        )?;
        for (index, ambient) in maps.ambient.iter().enumerate() {
            device.create_shader_resource_view(
                ambient,
                Some(&ShaderResourceViewDesc::default().set_format(AMBIENT_MAP_FORMAT)),
                srv_cpu.advance(AMBIENT_SRV + index as u32),
            )?;
            device.create_render_target_view(
                ambient,
                Some(&RenderTargetViewDesc::default().set_format(AMBIENT_MAP_FORMAT)),
                rtv_cpu.advance(AMBIENT_RTV + index as u32),
            )?;
        }
        if self.unordered_access {
            device.create_unordered_access_view(
                &maps.ambient[0],
                Some(&UnorderedAccessViewDesc::default().set_format(AMBIENT_MAP_FORMAT)),
                srv_cpu.advance(AMBIENT_UAV),
            )?;
        }
        device.create_render_target_view(
            &maps.normal,
            Some(&RenderTargetViewDesc::default().set_format(NORMAL_MAP_FORMAT)),
            rtv_cpu.advance(NORMAL_RTV),
        )?;
        device.create_depth_stencil_view(
            &maps.depth,
            Some(&DepthStencilViewDesc::default().set_format(DEPTH_DSV_FORMAT)),
            dsv_cpu,
        )?;

        self.views = Some(AoViews {
            srv_heap: heaps.srv.clone(),
            normal_srv: srv_gpu.advance(NORMAL_SRV),
            depth_srv: srv_gpu.advance(DEPTH_SRV),
            random_srv: srv_gpu.advance(RANDOM_SRV),
            ambient_srv: [srv_gpu.advance(AMBIENT_SRV), srv_gpu.advance(AMBIENT_SRV + 1)],
            ambient_uav: if self.unordered_access {
                Some(srv_gpu.advance(AMBIENT_UAV))
            } else {
                None
            },
            normal_rtv: rtv_cpu.advance(NORMAL_RTV),
            ambient_rtv: [rtv_cpu.advance(AMBIENT_RTV), rtv_cpu.advance(AMBIENT_RTV + 1)],
            depth_dsv: dsv_cpu,
        });
        Ok(())
    }

    fn device(&self) -> AoResult<&Device> {
        self.device.as_ref().ok_or(AoError::NotInitialized(self.name))
    }

    fn views(&self) -> AoResult<&AoViews> {
        self.views.as_ref().ok_or(AoError::NotInitialized(self.name))
    }

    fn maps(&self) -> AoResult<&AoMaps> {
        self.maps.as_ref().ok_or(AoError::NotInitialized(self.name))
    }
}

/// One resource set per device plus the shared maps between them
pub struct DevicePairResources<R> {
    prime: R,
    second: R,
    cross: CrossAdapterResourceSet,
    width: u32,
    height: u32,
}

impl<R: AoResourceSet + Default> Default for DevicePairResources<R> {
    fn default() -> Self {
        Self {
            prime: R::default(),
            second: R::default(),
            cross: CrossAdapterResourceSet::new(),
            width: 0,
            height: 0,
        }
    }
}

impl<R: AoResourceSet> DevicePairResources<R> {
    pub fn initialize(
        &mut self,
        prime: &GpuDevice,
        second: &GpuDevice,
        input_layout: &InputLayoutDesc,
        width: u32,
        height: u32,
    ) -> AoResult<()> {
        self.prime.initialize(prime, input_layout)?;
        self.prime.on_resize(width, height)?;
        self.second.initialize(second, input_layout)?;
        self.second.on_resize(width, height)?;
        self.cross
            .initialize(self.prime.maps().ok(), prime, second)?;
        self.width = width;
        self.height = height;
        trace!(
            "Initialized maps on '{}' and '{}' at {}x{}",
            prime.name(),
            second.name(),
            width,
            height
        );
        Ok(())
    }

    /// Resizes both resource sets and then the shared maps. Returns
    /// whether anything was recreated.
    pub fn on_resize(&mut self, width: u32, height: u32) -> AoResult<bool> {
        if self.width == width && self.height == height {
            return Ok(false);
        }
        self.prime.on_resize(width, height)?;
        self.second.on_resize(width, height)?;
        self.cross.on_resize(width, height)?;
        self.width = width;
        self.height = height;
        Ok(true)
    }

    pub fn get(&self, role: DeviceRole) -> &R {
        match role {
            DeviceRole::Prime => &self.prime,
            DeviceRole::Second => &self.second,
        }
    }

    pub fn cross(&self) -> &CrossAdapterResourceSet {
        &self.cross
    }
}

/// Resources of the pixel shader SSAO pass and its bilateral blur
pub struct SsaoResources {
    core: AoResourceCore,
    root_signature: Option<RootSignature>,
    ssao_pso: Option<PipelineState>,
    blur_pso: Option<PipelineState>,
}

impl Default for SsaoResources {
    fn default() -> Self {
        Self::new()
    }
}

impl SsaoResources {
    pub fn new() -> Self {
        Self {
            core: AoResourceCore::new("SSAO", false),
            root_signature: None,
            ssao_pso: None,
            blur_pso: None,
        }
    }

    pub fn blur_pso(&self) -> AoResult<&PipelineState> {
        self.blur_pso.as_ref().ok_or(AoError::NotInitialized("SSAO blur pipeline"))
    }

    fn build_root_signature(device: &Device) -> DxResult<RootSignature> {
        let parameters = [
            RootParameter::default()
                .set_parameter_type(RootParameterType::Cbv)
                .set_descriptor(&RootDescriptor::default().set_shader_register(Elements(0)))
                .set_shader_visibility(ShaderVisibility::Pixel),
            RootParameter::default()
                .set_parameter_type(RootParameterType::Constants32Bit)
                .set_constants(
                    &RootConstants::default()
                        .set_shader_register(Elements(1))
                        .set_num_32_bit_values(Elements(1)),
                )
                .set_shader_visibility(ShaderVisibility::Pixel),
            // Normal and depth maps
            RootParameter::default()
                .set_parameter_type(RootParameterType::DescriptorTable)
                .set_descriptor_table(&srv_table(0, 2))
                .set_shader_visibility(ShaderVisibility::Pixel),
            // Random vector map for the occlusion pass, the blur input
            // for the blur pass
            RootParameter::default()
                .set_parameter_type(RootParameterType::DescriptorTable)
                .set_descriptor_table(&srv_table(2, 1))
                .set_shader_visibility(ShaderVisibility::Pixel),
        ];
        let root_signature = device.create_root_signature(
            0,
            &RootSignatureDesc::default()
                .set_parameters(&parameters)
                .set_static_samplers(&static_samplers())
                .set_flags(RootSignatureFlags::AllowInputAssemblerInputLayout),
        )?;
        root_signature.set_name("SSAO root signature")?;
        Ok(root_signature)
    }

    fn build_pso(
        device: &Device,
        root_signature: &RootSignature,
        input_layout: &InputLayoutDesc,
        shader: Arc<dyn PixelShader>,
        name: &str,
    ) -> DxResult<PipelineState> {
        let pso = device.create_graphics_pipeline_state(
            &GraphicsPipelineStateDesc::default()
                .set_root_signature(root_signature)
                .set_pixel_shader(shader)
                .set_input_layout(input_layout)
                .set_depth_stencil_state(
                    &DepthStencilDesc::default()
                        .set_depth_enable(false)
                        .set_depth_write(false),
                )
                .set_rtv_formats(&[AMBIENT_MAP_FORMAT])
                .set_dsv_format(DxgiFormat::Unknown),
        )?;
        pso.set_name(name)?;
        Ok(pso)
    }
}

impl AoResourceSet for SsaoResources {
    fn initialize(&mut self, gpu: &GpuDevice, input_layout: &InputLayoutDesc) -> AoResult<()> {
        self.core.initialize(gpu)?;
        let root_signature = Self::build_root_signature(gpu.device())?;
        self.ssao_pso = Some(Self::build_pso(
            gpu.device(),
            &root_signature,
            input_layout,
            Arc::new(SsaoPixelShader),
            "SSAO pipeline",
        )?);
        self.blur_pso = Some(Self::build_pso(
            gpu.device(),
            &root_signature,
            input_layout,
            Arc::new(SsaoBlurShader),
            "SSAO blur pipeline",
        )?);
        self.root_signature = Some(root_signature);
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) -> AoResult<bool> {
        self.core.on_resize(width, height)
    }

    fn root_signature(&self) -> AoResult<&RootSignature> {
        self.root_signature
            .as_ref()
            .ok_or(AoError::NotInitialized("SSAO root signature"))
    }

    fn pso(&self) -> AoResult<&PipelineState> {
        self.ssao_pso.as_ref().ok_or(AoError::NotInitialized("SSAO pipeline"))
    }

    fn views(&self) -> AoResult<&AoViews> {
        self.core.views()
    }

    fn maps(&self) -> AoResult<&AoMaps> {
        self.core.maps()
    }

    fn size(&self) -> (u32, u32) {
        (self.core.width, self.core.height)
    }
}

/// Resources of the compute HBAO pass. The ambient map gets an additional
/// unordered access view.
pub struct HbaoResources {
    core: AoResourceCore,
    root_signature: Option<RootSignature>,
    pso: Option<PipelineState>,
}

impl Default for HbaoResources {
    fn default() -> Self {
        Self::new()
    }
}

impl HbaoResources {
    pub fn new() -> Self {
        Self {
            core: AoResourceCore::new("HBAO", true),
            root_signature: None,
            pso: None,
        }
    }

    fn build_root_signature(device: &Device) -> DxResult<RootSignature> {
        let parameters = [
            RootParameter::default()
                .set_parameter_type(RootParameterType::Cbv)
                .set_descriptor(&RootDescriptor::default().set_shader_register(Elements(0))),
            RootParameter::default()
                .set_parameter_type(RootParameterType::DescriptorTable)
                .set_descriptor_table(&srv_table(0, 1)),
            RootParameter::default()
                .set_parameter_type(RootParameterType::DescriptorTable)
                .set_descriptor_table(&srv_table(1, 1)),
            RootParameter::default()
                .set_parameter_type(RootParameterType::DescriptorTable)
                .set_descriptor_table(&RootDescriptorTable::default().set_descriptor_ranges(&[
                    DescriptorRange::default()
                        .set_range_type(DescriptorRangeType::Uav)
                        .set_num_descriptors(Elements(1))
                        .set_base_shader_register(Elements(0)),
                ])),
        ];
        let root_signature = device.create_root_signature(
            0,
            &RootSignatureDesc::default()
                .set_parameters(&parameters)
                .set_static_samplers(&static_samplers()),
        )?;
        root_signature.set_name("HBAO root signature")?;
        Ok(root_signature)
    }
}

impl AoResourceSet for HbaoResources {
    fn initialize(&mut self, gpu: &GpuDevice, _input_layout: &InputLayoutDesc) -> AoResult<()> {
        self.core.initialize(gpu)?;
        let root_signature = Self::build_root_signature(gpu.device())?;
        let pso = self.core.device()?.create_compute_pipeline_state(
            &ComputePipelineStateDesc::default()
                .set_root_signature(&root_signature)
                .set_compute_shader(Arc::new(HbaoComputeShader)),
        )?;
        pso.set_name("HBAO pipeline")?;
        self.pso = Some(pso);
        self.root_signature = Some(root_signature);
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) -> AoResult<bool> {
        self.core.on_resize(width, height)
    }

    fn root_signature(&self) -> AoResult<&RootSignature> {
        self.root_signature
            .as_ref()
            .ok_or(AoError::NotInitialized("HBAO root signature"))
    }

    fn pso(&self) -> AoResult<&PipelineState> {
        self.pso.as_ref().ok_or(AoError::NotInitialized("HBAO pipeline"))
    }

    fn views(&self) -> AoResult<&AoViews> {
        self.core.views()
    }

    fn maps(&self) -> AoResult<&AoMaps> {
        self.core.maps()
    }

    fn size(&self) -> (u32, u32) {
        (self.core.width, self.core.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::create_device_pair;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn length(vector: &[f32; 4]) -> f32 {
        (vector[0] * vector[0] + vector[1] * vector[1] + vector[2] * vector[2]).sqrt()
    }

    #[test]
    fn offset_vectors_cover_corners_and_faces() {
        let mut rng = StdRng::seed_from_u64(7);
        let offsets = build_offset_vectors(&mut rng);
        assert_eq!(offsets.len(), 14);

        let inv_sqrt3 = 1. / 3f32.sqrt();
        for offset in &offsets[..8] {
            let len = length(offset);
            assert!((0.25..=1.0 + 1e-6).contains(&len), "{}", len);
            for component in &offset[..3] {
                assert!((component.abs() / len - inv_sqrt3).abs() < 1e-5);
            }
        }
        for offset in &offsets[8..] {
            let len = length(offset);
            assert!((0.25..=1.0 + 1e-6).contains(&len), "{}", len);
            let non_zero = offset[..3].iter().filter(|c| **c != 0.).count();
            assert_eq!(non_zero, 1);
        }
    }

    #[test]
    fn resize_to_same_size_keeps_maps() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, _) = create_device_pair(&factory).expect("Cannot create devices");
        let mut resources = SsaoResources::new();
        resources
            .initialize(&prime, &InputLayoutDesc::default())
            .expect("Cannot initialize");

        assert!(resources.on_resize(32, 16).expect("Cannot resize"));
        let normal = resources.maps().expect("No maps").normal.clone();
        assert!(!resources.on_resize(32, 16).expect("Cannot resize"));
        assert_eq!(resources.maps().expect("No maps").normal, normal);

        assert!(resources.on_resize(16, 16).expect("Cannot resize"));
        assert_ne!(resources.maps().expect("No maps").normal, normal);
        assert_eq!(resources.size(), (16, 16));
    }

    #[test]
    fn resize_before_initialize_fails() {
        let mut resources = HbaoResources::new();
        assert!(matches!(
            resources.on_resize(8, 8),
            Err(AoError::NotInitialized(_))
        ));
    }

    #[test]
    fn hbao_maps_expose_unordered_access() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, _) = create_device_pair(&factory).expect("Cannot create devices");
        let mut resources = HbaoResources::new();
        resources
            .initialize(&prime, &InputLayoutDesc::default())
            .expect("Cannot initialize");
        resources.on_resize(8, 8).expect("Cannot resize");

        let views = resources.views().expect("No views");
        assert!(views.ambient_uav.is_some());
        let ambient = &resources.maps().expect("No maps").ambient[0];
        assert!(ambient
            .get_desc()
            .flags()
            .contains(ResourceFlags::AllowUnorderedAccess));
        assert_eq!(
            resources.maps().expect("No maps").random.state(),
            ResourceStates::AllShaderResource
        );
    }
}
