use std::sync::Arc;

use crate::const_wrappers::*;
use crate::enum_wrappers::*;
use crate::shader::{ComputeShader, PixelShader};
use crate::utils::*;
use crate::{Resource, RootSignature};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuVirtualAddress(pub u64);

impl std::ops::Add<Bytes> for GpuVirtualAddress {
    type Output = Self;

    fn add(self, rhs: Bytes) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdapterDesc {
    pub description: String,
    pub dedicated_video_memory: Bytes,
    pub flags: AdapterFlags,
}

impl Default for AdapterDesc {
    fn default() -> Self {
        Self {
            description: String::from("Software Adapter"),
            dedicated_video_memory: Bytes(512 * 1024 * 1024),
            flags: AdapterFlags::None,
        }
    }
}

impl AdapterDesc {
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    pub fn set_dedicated_video_memory(mut self, memory: Bytes) -> Self {
        self.dedicated_video_memory = memory;
        self
    }

    pub fn set_flags(mut self, flags: AdapterFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResourceDesc {
    dimension: ResourceDimension,
    alignment: Bytes,
    width: u64,
    height: u32,
    depth_or_array_size: u16,
    mip_levels: u16,
    format: DxgiFormat,
    layout: TextureLayout,
    flags: ResourceFlags,
}

impl Default for ResourceDesc {
    fn default() -> Self {
        ResourceDesc {
            dimension: ResourceDimension::Unknown,
            alignment: DEFAULT_RESOURCE_ALIGNMENT,
            width: 0,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: DxgiFormat::Unknown,
            layout: TextureLayout::Unknown,
            flags: ResourceFlags::None,
        }
    }
}

impl ResourceDesc {
    /// Row-major buffer description of the given size
    pub fn buffer(size: Bytes) -> Self {
        ResourceDesc::default()
            .set_dimension(ResourceDimension::Buffer)
            .set_width(size.0)
            .set_layout(TextureLayout::RowMajor)
    }

    pub fn texture_2d(width: u32, height: u32, format: DxgiFormat) -> Self {
        ResourceDesc::default()
            .set_dimension(ResourceDimension::Texture2D)
            .set_width(u64::from(width))
            .set_height(height)
            .set_format(format)
    }

    pub fn set_dimension(mut self, dimension: ResourceDimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn dimension(&self) -> ResourceDimension {
        self.dimension
    }

    pub fn set_alignment(mut self, alignment: Bytes) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn alignment(&self) -> Bytes {
        self.alignment
    }

    pub fn set_width(mut self, width: u64) -> Self {
        self.width = width;
        self
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    pub fn set_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_depth_or_array_size(mut self, depth_or_array_size: u16) -> Self {
        self.depth_or_array_size = depth_or_array_size;
        self
    }

    pub fn depth_or_array_size(&self) -> u16 {
        self.depth_or_array_size
    }

    pub fn set_mip_levels(mut self, mip_levels: u16) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn mip_levels(&self) -> u16 {
        self.mip_levels
    }

    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }

    pub fn set_layout(mut self, layout: TextureLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> TextureLayout {
        self.layout
    }

    pub fn set_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> ResourceFlags {
        self.flags
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HeapProperties {
    heap_type: HeapType,
}

impl Default for HeapProperties {
    fn default() -> Self {
        HeapProperties {
            heap_type: HeapType::Default,
        }
    }
}

impl HeapProperties {
    pub fn set_type(mut self, heap_type: HeapType) -> Self {
        self.heap_type = heap_type;
        self
    }

    pub fn heap_type(&self) -> HeapType {
        self.heap_type
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HeapDesc {
    size_in_bytes: Bytes,
    properties: HeapProperties,
    alignment: Bytes,
    flags: HeapFlags,
}

impl Default for HeapDesc {
    fn default() -> Self {
        Self {
            size_in_bytes: Bytes(0),
            properties: HeapProperties::default(),
            alignment: DEFAULT_RESOURCE_ALIGNMENT,
            flags: HeapFlags::None,
        }
    }
}

impl HeapDesc {
    pub fn set_size_in_bytes(mut self, size_in_bytes: Bytes) -> Self {
        self.size_in_bytes = size_in_bytes;
        self
    }

    pub fn size_in_bytes(&self) -> Bytes {
        self.size_in_bytes
    }

    pub fn set_properties(mut self, properties: &HeapProperties) -> Self {
        self.properties = *properties;
        self
    }

    pub fn properties(&self) -> &HeapProperties {
        &self.properties
    }

    pub fn set_alignment(mut self, alignment: Bytes) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn alignment(&self) -> Bytes {
        self.alignment
    }

    pub fn set_flags(mut self, flags: HeapFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> HeapFlags {
        self.flags
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ClearValue {
    format: DxgiFormat,
    color: [f32; 4],
}

impl ClearValue {
    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }

    pub fn set_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }
}

#[derive(Clone, Debug)]
pub enum ResourceBarrier {
    Transition(ResourceTransitionBarrier),
}

impl ResourceBarrier {
    // Convenience methods
    pub fn transition(desc: &ResourceTransitionBarrier) -> Self {
        ResourceBarrier::Transition(desc.clone())
    }
}

#[derive(Clone, Debug)]
pub struct ResourceTransitionBarrier {
    resource: Option<Resource>,
    subresource: u32,
    state_before: ResourceStates,
    state_after: ResourceStates,
}

impl Default for ResourceTransitionBarrier {
    fn default() -> Self {
        Self {
            resource: None,
            subresource: RESOURCE_BARRIER_ALL_SUBRESOURCES,
            state_before: ResourceStates::Common,
            state_after: ResourceStates::Common,
        }
    }
}

impl ResourceTransitionBarrier {
    pub fn set_resource(mut self, resource: &Resource) -> Self {
        self.resource = Some(resource.clone());
        self
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    // None value means "all subresources"
    pub fn set_subresource(mut self, subresource: Option<u32>) -> Self {
        self.subresource =
            subresource.unwrap_or(RESOURCE_BARRIER_ALL_SUBRESOURCES);
        self
    }

    pub fn set_state_before(mut self, state_before: ResourceStates) -> Self {
        self.state_before = state_before;
        self
    }

    pub fn state_before(&self) -> ResourceStates {
        self.state_before
    }

    pub fn set_state_after(mut self, state_after: ResourceStates) -> Self {
        self.state_after = state_after;
        self
    }

    pub fn state_after(&self) -> ResourceStates {
        self.state_after
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Viewport {
    top_left_x: f32,
    top_left_y: f32,
    width: f32,
    height: f32,
    min_depth: f32,
    max_depth: f32,
}

impl Viewport {
    pub fn set_top_left_x(mut self, top_left_x: f32) -> Self {
        self.top_left_x = top_left_x;
        self
    }

    pub fn top_left_x(&self) -> f32 {
        self.top_left_x
    }

    pub fn set_top_left_y(mut self, top_left_y: f32) -> Self {
        self.top_left_y = top_left_y;
        self
    }

    pub fn top_left_y(&self) -> f32 {
        self.top_left_y
    }

    pub fn set_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn set_height(mut self, height: f32) -> Self {
        self.height = height;
        self
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn set_min_depth(mut self, min_depth: f32) -> Self {
        self.min_depth = min_depth;
        self
    }

    pub fn set_max_depth(mut self, max_depth: f32) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl Rect {
    pub fn set_left(mut self, left: i32) -> Self {
        self.left = left;
        self
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn set_top(mut self, top: i32) -> Self {
        self.top = top;
        self
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn set_right(mut self, right: i32) -> Self {
        self.right = right;
        self
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn set_bottom(mut self, bottom: i32) -> Self {
        self.bottom = bottom;
        self
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DescriptorRangeOffset {
    Append,
    Offset(u32),
}

impl DescriptorRangeOffset {
    pub fn append() -> Self {
        DescriptorRangeOffset::Append
    }
}

impl From<u32> for DescriptorRangeOffset {
    fn from(offset: u32) -> Self {
        DescriptorRangeOffset::Offset(offset)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DescriptorRange {
    range_type: DescriptorRangeType,
    num_descriptors: u32,
    base_shader_register: u32,
    register_space: u32,
    offset_in_descriptors_from_table_start: DescriptorRangeOffset,
}

impl Default for DescriptorRange {
    fn default() -> Self {
        Self {
            range_type: DescriptorRangeType::Srv,
            num_descriptors: 1,
            base_shader_register: 0,
            register_space: 0,
            offset_in_descriptors_from_table_start:
                DescriptorRangeOffset::Append,
        }
    }
}

impl DescriptorRange {
    pub fn set_range_type(mut self, range_type: DescriptorRangeType) -> Self {
        self.range_type = range_type;
        self
    }

    pub fn range_type(&self) -> DescriptorRangeType {
        self.range_type
    }

    pub fn set_num_descriptors(mut self, num_descriptors: Elements) -> Self {
        self.num_descriptors = num_descriptors.0 as u32;
        self
    }

    pub fn num_descriptors(&self) -> u32 {
        self.num_descriptors
    }

    pub fn set_base_shader_register(mut self, register: Elements) -> Self {
        self.base_shader_register = register.0 as u32;
        self
    }

    pub fn base_shader_register(&self) -> u32 {
        self.base_shader_register
    }

    pub fn set_register_space(mut self, space: Elements) -> Self {
        self.register_space = space.0 as u32;
        self
    }

    pub fn set_offset_in_descriptors_from_table_start(
        mut self,
        offset: DescriptorRangeOffset,
    ) -> Self {
        self.offset_in_descriptors_from_table_start = offset;
        self
    }

    pub fn offset_in_descriptors_from_table_start(
        &self,
    ) -> DescriptorRangeOffset {
        self.offset_in_descriptors_from_table_start
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RootDescriptor {
    shader_register: u32,
    register_space: u32,
}

impl RootDescriptor {
    pub fn set_shader_register(mut self, register: Elements) -> Self {
        self.shader_register = register.0 as u32;
        self
    }

    pub fn shader_register(&self) -> u32 {
        self.shader_register
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RootConstants {
    shader_register: u32,
    register_space: u32,
    num_32_bit_values: u32,
}

impl RootConstants {
    pub fn set_shader_register(mut self, register: Elements) -> Self {
        self.shader_register = register.0 as u32;
        self
    }

    pub fn shader_register(&self) -> u32 {
        self.shader_register
    }

    pub fn set_num_32_bit_values(mut self, count: Elements) -> Self {
        self.num_32_bit_values = count.0 as u32;
        self
    }

    pub fn num_32_bit_values(&self) -> u32 {
        self.num_32_bit_values
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RootDescriptorTable {
    ranges: Vec<DescriptorRange>,
}

impl RootDescriptorTable {
    pub fn set_descriptor_ranges(mut self, ranges: &[DescriptorRange]) -> Self {
        self.ranges = ranges.to_vec();
        self
    }

    pub fn descriptor_ranges(&self) -> &[DescriptorRange] {
        &self.ranges
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RootParameterType {
    DescriptorTable,
    Constants32Bit,
    Cbv,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootParameter {
    parameter_type: RootParameterType,
    descriptor: RootDescriptor,
    constants: RootConstants,
    descriptor_table: RootDescriptorTable,
    shader_visibility: ShaderVisibility,
}

impl Default for RootParameter {
    fn default() -> Self {
        Self {
            parameter_type: RootParameterType::Cbv,
            descriptor: RootDescriptor::default(),
            constants: RootConstants::default(),
            descriptor_table: RootDescriptorTable::default(),
            shader_visibility: ShaderVisibility::All,
        }
    }
}

impl RootParameter {
    pub fn set_parameter_type(
        mut self,
        parameter_type: RootParameterType,
    ) -> Self {
        self.parameter_type = parameter_type;
        self
    }

    pub fn parameter_type(&self) -> RootParameterType {
        self.parameter_type
    }

    pub fn set_descriptor(mut self, descriptor: &RootDescriptor) -> Self {
        self.descriptor = *descriptor;
        self
    }

    pub fn descriptor(&self) -> &RootDescriptor {
        &self.descriptor
    }

    pub fn set_constants(mut self, constants: &RootConstants) -> Self {
        self.constants = *constants;
        self
    }

    pub fn constants(&self) -> &RootConstants {
        &self.constants
    }

    pub fn set_descriptor_table(mut self, table: &RootDescriptorTable) -> Self {
        self.descriptor_table = table.clone();
        self
    }

    pub fn descriptor_table(&self) -> &RootDescriptorTable {
        &self.descriptor_table
    }

    pub fn set_shader_visibility(
        mut self,
        shader_visibility: ShaderVisibility,
    ) -> Self {
        self.shader_visibility = shader_visibility;
        self
    }

    pub fn shader_visibility(&self) -> ShaderVisibility {
        self.shader_visibility
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StaticSamplerDesc {
    filter: Filter,
    address_u: TextureAddressMode,
    address_v: TextureAddressMode,
    address_w: TextureAddressMode,
    comparison_func: ComparisonFunc,
    border_color: StaticBorderColor,
    shader_register: u32,
    shader_visibility: ShaderVisibility,
}

impl Default for StaticSamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::MinMagMipLinear,
            address_u: TextureAddressMode::Wrap,
            address_v: TextureAddressMode::Wrap,
            address_w: TextureAddressMode::Wrap,
            comparison_func: ComparisonFunc::LessEqual,
            border_color: StaticBorderColor::OpaqueWhite,
            shader_register: 0,
            shader_visibility: ShaderVisibility::All,
        }
    }
}

impl StaticSamplerDesc {
    pub fn set_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn set_address_u(mut self, mode: TextureAddressMode) -> Self {
        self.address_u = mode;
        self
    }

    pub fn address_u(&self) -> TextureAddressMode {
        self.address_u
    }

    pub fn set_address_v(mut self, mode: TextureAddressMode) -> Self {
        self.address_v = mode;
        self
    }

    pub fn address_v(&self) -> TextureAddressMode {
        self.address_v
    }

    pub fn set_address_w(mut self, mode: TextureAddressMode) -> Self {
        self.address_w = mode;
        self
    }

    pub fn set_comparison_func(mut self, func: ComparisonFunc) -> Self {
        self.comparison_func = func;
        self
    }

    pub fn set_border_color(mut self, color: StaticBorderColor) -> Self {
        self.border_color = color;
        self
    }

    pub fn border_color(&self) -> StaticBorderColor {
        self.border_color
    }

    pub fn set_shader_register(mut self, register: Elements) -> Self {
        self.shader_register = register.0 as u32;
        self
    }

    pub fn shader_register(&self) -> u32 {
        self.shader_register
    }

    pub fn set_shader_visibility(mut self, visibility: ShaderVisibility) -> Self {
        self.shader_visibility = visibility;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RootSignatureDesc {
    parameters: Vec<RootParameter>,
    static_samplers: Vec<StaticSamplerDesc>,
    flags: RootSignatureFlags,
}

impl Default for RootSignatureDesc {
    fn default() -> Self {
        Self {
            parameters: vec![],
            static_samplers: vec![],
            flags: RootSignatureFlags::None,
        }
    }
}

impl RootSignatureDesc {
    pub fn set_parameters(mut self, parameters: &[RootParameter]) -> Self {
        self.parameters = parameters.to_vec();
        self
    }

    pub fn parameters(&self) -> &[RootParameter] {
        &self.parameters
    }

    pub fn set_static_samplers(mut self, samplers: &[StaticSamplerDesc]) -> Self {
        self.static_samplers = samplers.to_vec();
        self
    }

    pub fn static_samplers(&self) -> &[StaticSamplerDesc] {
        &self.static_samplers
    }

    pub fn set_flags(mut self, flags: RootSignatureFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> RootSignatureFlags {
        self.flags
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputElementDesc {
    semantic_name: String,
    semantic_index: u32,
    format: DxgiFormat,
    input_slot: u32,
    aligned_byte_offset: Bytes,
}

impl Default for InputElementDesc {
    fn default() -> Self {
        Self {
            semantic_name: String::new(),
            semantic_index: 0,
            format: DxgiFormat::Unknown,
            input_slot: 0,
            aligned_byte_offset: Bytes(0),
        }
    }
}

impl InputElementDesc {
    pub fn set_name(mut self, name: &str) -> Self {
        self.semantic_name = name.to_owned();
        self
    }

    pub fn name(&self) -> &str {
        &self.semantic_name
    }

    pub fn set_semantic_index(mut self, index: u32) -> Self {
        self.semantic_index = index;
        self
    }

    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }

    pub fn set_input_slot(mut self, slot: u32) -> Self {
        self.input_slot = slot;
        self
    }

    pub fn set_offset(mut self, offset: Bytes) -> Self {
        self.aligned_byte_offset = offset;
        self
    }

    pub fn offset(&self) -> Bytes {
        self.aligned_byte_offset
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputLayoutDesc {
    elements: Vec<InputElementDesc>,
}

impl InputLayoutDesc {
    pub fn from_input_elements(mut self, elements: &[InputElementDesc]) -> Self {
        self.elements = elements.to_vec();
        self
    }

    pub fn elements(&self) -> &[InputElementDesc] {
        &self.elements
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DepthStencilDesc {
    depth_enable: bool,
    depth_write: bool,
    depth_func: ComparisonFunc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_func: ComparisonFunc::Less,
        }
    }
}

impl DepthStencilDesc {
    pub fn set_depth_enable(mut self, depth_enable: bool) -> Self {
        self.depth_enable = depth_enable;
        self
    }

    pub fn depth_enable(&self) -> bool {
        self.depth_enable
    }

    pub fn set_depth_write(mut self, depth_write: bool) -> Self {
        self.depth_write = depth_write;
        self
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    pub fn set_depth_func(mut self, depth_func: ComparisonFunc) -> Self {
        self.depth_func = depth_func;
        self
    }

    pub fn depth_func(&self) -> ComparisonFunc {
        self.depth_func
    }
}

#[derive(Clone)]
pub struct GraphicsPipelineStateDesc {
    pub(crate) root_signature: Option<RootSignature>,
    pub(crate) pixel_shader: Option<Arc<dyn PixelShader>>,
    pub(crate) input_layout: InputLayoutDesc,
    pub(crate) depth_stencil_state: DepthStencilDesc,
    pub(crate) rtv_formats: Vec<DxgiFormat>,
    pub(crate) dsv_format: DxgiFormat,
}

impl Default for GraphicsPipelineStateDesc {
    fn default() -> Self {
        Self {
            root_signature: None,
            pixel_shader: None,
            input_layout: InputLayoutDesc::default(),
            depth_stencil_state: DepthStencilDesc::default(),
            rtv_formats: vec![],
            dsv_format: DxgiFormat::Unknown,
        }
    }
}

impl GraphicsPipelineStateDesc {
    pub fn set_root_signature(mut self, root_signature: &RootSignature) -> Self {
        self.root_signature = Some(root_signature.clone());
        self
    }

    pub fn set_pixel_shader(mut self, shader: Arc<dyn PixelShader>) -> Self {
        self.pixel_shader = Some(shader);
        self
    }

    pub fn set_input_layout(mut self, input_layout: &InputLayoutDesc) -> Self {
        self.input_layout = input_layout.clone();
        self
    }

    pub fn set_depth_stencil_state(
        mut self,
        depth_stencil_state: &DepthStencilDesc,
    ) -> Self {
        self.depth_stencil_state = *depth_stencil_state;
        self
    }

    pub fn set_rtv_formats(mut self, formats: &[DxgiFormat]) -> Self {
        self.rtv_formats = formats.to_vec();
        self
    }

    pub fn set_dsv_format(mut self, format: DxgiFormat) -> Self {
        self.dsv_format = format;
        self
    }
}

#[derive(Clone, Default)]
pub struct ComputePipelineStateDesc {
    pub(crate) root_signature: Option<RootSignature>,
    pub(crate) compute_shader: Option<Arc<dyn ComputeShader>>,
}

impl ComputePipelineStateDesc {
    pub fn set_root_signature(mut self, root_signature: &RootSignature) -> Self {
        self.root_signature = Some(root_signature.clone());
        self
    }

    pub fn set_compute_shader(mut self, shader: Arc<dyn ComputeShader>) -> Self {
        self.compute_shader = Some(shader);
        self
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderResourceViewDesc {
    format: DxgiFormat,
}

impl ShaderResourceViewDesc {
    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderTargetViewDesc {
    format: DxgiFormat,
}

impl RenderTargetViewDesc {
    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DepthStencilViewDesc {
    format: DxgiFormat,
}

impl DepthStencilViewDesc {
    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UnorderedAccessViewDesc {
    format: DxgiFormat,
}

impl UnorderedAccessViewDesc {
    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConstantBufferViewDesc {
    buffer_location: GpuVirtualAddress,
    size_in_bytes: Bytes,
}

impl ConstantBufferViewDesc {
    pub fn new(resource: &Resource, size: Bytes) -> Self {
        Self {
            buffer_location: resource.get_gpu_virtual_address(),
            size_in_bytes: size,
        }
    }

    pub fn buffer_location(&self) -> GpuVirtualAddress {
        self.buffer_location
    }

    pub fn size_in_bytes(&self) -> Bytes {
        self.size_in_bytes
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubresourceFootprint {
    format: DxgiFormat,
    width: u32,
    height: u32,
    depth: u32,
    row_pitch: u32,
}

impl Default for SubresourceFootprint {
    fn default() -> Self {
        Self {
            format: DxgiFormat::R8G8B8A8_UNorm,
            width: 0,
            height: 1,
            depth: 1,
            row_pitch: 0,
        }
    }
}

impl SubresourceFootprint {
    pub fn set_format(mut self, format: DxgiFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> DxgiFormat {
        self.format
    }

    pub fn set_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn set_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn set_row_pitch(mut self, row_pitch: u32) -> Self {
        self.row_pitch = row_pitch;
        self
    }

    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlacedSubresourceFootprint {
    offset: u64,
    footprint: SubresourceFootprint,
}

impl PlacedSubresourceFootprint {
    pub fn set_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn set_footprint(mut self, footprint: SubresourceFootprint) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn footprint(&self) -> &SubresourceFootprint {
        &self.footprint
    }
}

#[derive(Clone, Debug)]
pub enum TextureLocationType {
    PlacedFootprint(PlacedSubresourceFootprint),
    SubresourceIndex(Elements),
}

#[derive(Clone, Debug)]
pub struct TextureCopyLocation {
    pub(crate) resource: Resource,
    pub(crate) location: TextureLocationType,
}

impl TextureCopyLocation {
    pub fn new(resource: &Resource, location: &TextureLocationType) -> Self {
        Self {
            resource: resource.clone(),
            location: location.clone(),
        }
    }

    pub fn new_subresource_index(resource: &Resource, index: u32) -> Self {
        Self::new(
            resource,
            &TextureLocationType::SubresourceIndex(Elements::from(index)),
        )
    }

    pub fn new_placed_footprint(
        resource: &Resource,
        footprint: PlacedSubresourceFootprint,
    ) -> Self {
        Self::new(resource, &TextureLocationType::PlacedFootprint(footprint))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandQueueDesc {
    queue_type: CommandListType,
}

impl Default for CommandQueueDesc {
    fn default() -> Self {
        Self {
            queue_type: CommandListType::Direct,
        }
    }
}

impl CommandQueueDesc {
    pub fn set_type(mut self, command_list_type: CommandListType) -> Self {
        self.queue_type = command_list_type;
        self
    }

    pub fn queue_type(&self) -> CommandListType {
        self.queue_type
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    heap_type: DescriptorHeapType,
    num_descriptors: u32,
    flags: DescriptorHeapFlags,
}

impl Default for DescriptorHeapDesc {
    fn default() -> Self {
        Self {
            heap_type: DescriptorHeapType::CBV_SRV_UAV,
            num_descriptors: 0,
            flags: DescriptorHeapFlags::None,
        }
    }
}

impl DescriptorHeapDesc {
    pub fn set_type(mut self, heap_type: DescriptorHeapType) -> Self {
        self.heap_type = heap_type;
        self
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn set_num_descriptors(mut self, count: Elements) -> Self {
        self.num_descriptors = count.0 as u32;
        self
    }

    pub fn num_descriptors(&self) -> u32 {
        self.num_descriptors
    }

    pub fn set_flags(mut self, flags: DescriptorHeapFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> DescriptorHeapFlags {
        self.flags
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub category: MessageCategory,
    pub severity: MessageSeverity,
    pub description: String,
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:?}] [{:?}] {}",
            self.severity, self.category, self.description
        )
    }
}
