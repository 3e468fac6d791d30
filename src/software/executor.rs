use std::sync::Arc;

use log::trace;

use super::texel::{decode_texel, encode_texel};
use super::{lock, report, BindPoint, Command, TransitionRecord};
use crate::const_wrappers::*;
use crate::enum_wrappers::*;
use crate::shader::{ComputeContext, PixelInput, ShaderBindings, ShaderContext, TextureView};
use crate::struct_wrappers::*;
use crate::utils::Bytes;
use crate::{
    CpuDescriptorHandle, Descriptor, DescriptorHeap, DeviceInner, GpuDescriptorHandle,
    PipelineKind, PipelineState, Resource, RootSignature,
};

#[derive(Clone)]
enum RootArgument {
    Unset,
    ConstantBuffer(GpuVirtualAddress),
    Constants(Vec<u32>),
    Table(GpuDescriptorHandle),
}

#[derive(Default)]
struct RootState {
    root_signature: Option<RootSignature>,
    arguments: Vec<RootArgument>,
}

impl RootState {
    fn bind(&mut self, root_signature: &RootSignature) {
        let desc = &root_signature.inner.desc;
        self.arguments = desc
            .parameters()
            .iter()
            .map(|parameter| match parameter.parameter_type() {
                RootParameterType::Constants32Bit => RootArgument::Constants(vec![
                    0;
                    parameter.constants().num_32_bit_values()
                        as usize
                ]),
                _ => RootArgument::Unset,
            })
            .collect();
        self.root_signature = Some(root_signature.clone());
    }
}

/// Replays one closed command list against device memory. A fresh executor
/// is used per list, so no pipeline or binding state leaks between lists.
pub(crate) struct Executor<'a> {
    device: &'a DeviceInner,
    pipeline_state: Option<PipelineState>,
    graphics: RootState,
    compute: RootState,
    descriptor_heaps: Vec<DescriptorHeap>,
    render_targets: Vec<CpuDescriptorHandle>,
    depth_stencil: Option<CpuDescriptorHandle>,
    viewport: Option<Viewport>,
    scissor_rect: Option<Rect>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(device: &'a Arc<DeviceInner>) -> Self {
        Self {
            device,
            pipeline_state: None,
            graphics: RootState::default(),
            compute: RootState::default(),
            descriptor_heaps: vec![],
            render_targets: vec![],
            depth_stencil: None,
            viewport: None,
            scissor_rect: None,
        }
    }

    fn error(&self, category: MessageCategory, description: String) {
        report(self.device, MessageSeverity::Error, category, description);
    }

    pub(crate) fn run(&mut self, commands: &[Command]) {
        for command in commands {
            match command {
                Command::Barriers(transitions) => self.transition(transitions),
                Command::ClearRenderTarget { rtv, color } => {
                    self.clear_render_target(*rtv, *color)
                }
                Command::ClearDepthStencil { dsv, depth } => {
                    self.clear_depth_stencil(*dsv, *depth)
                }
                Command::CopyResource { dest, source } => {
                    self.copy_resource(dest, source)
                }
                Command::CopyTextureRegion { dest, source } => {
                    self.copy_texture_region(dest, source)
                }
                Command::SetPipelineState(pipeline_state) => {
                    self.pipeline_state = Some(pipeline_state.clone())
                }
                Command::SetRootSignature {
                    bind_point,
                    root_signature,
                } => self.root_state(*bind_point).bind(root_signature),
                Command::SetDescriptorHeaps(heaps) => {
                    self.descriptor_heaps = heaps.clone()
                }
                Command::SetRootConstantBufferView {
                    bind_point,
                    index,
                    address,
                } => self.set_argument(
                    *bind_point,
                    *index,
                    RootArgument::ConstantBuffer(*address),
                ),
                Command::SetRoot32BitConstant {
                    bind_point,
                    index,
                    value,
                    offset,
                } => self.set_root_constant(*bind_point, *index, *value, *offset),
                Command::SetRootDescriptorTable {
                    bind_point,
                    index,
                    base,
                } => self.set_argument(*bind_point, *index, RootArgument::Table(*base)),
                Command::SetRenderTargets { rtvs, dsv } => {
                    self.render_targets = rtvs.clone();
                    self.depth_stencil = *dsv;
                }
                Command::SetViewports(viewports) => {
                    self.viewport = viewports.first().copied()
                }
                Command::SetScissorRects(rects) => {
                    self.scissor_rect = rects.first().copied()
                }
                Command::Draw {
                    vertex_count,
                    instance_count,
                } => {
                    if *vertex_count > 0 && *instance_count > 0 {
                        self.draw();
                    }
                }
                Command::Dispatch(groups) => self.dispatch(*groups),
            }
        }
    }

    fn root_state(&mut self, bind_point: BindPoint) -> &mut RootState {
        match bind_point {
            BindPoint::Graphics => &mut self.graphics,
            BindPoint::Compute => &mut self.compute,
        }
    }

    fn set_argument(&mut self, bind_point: BindPoint, index: u32, argument: RootArgument) {
        let state = self.root_state(bind_point);
        let stored = match state.arguments.get_mut(index as usize) {
            Some(slot) => {
                *slot = argument;
                true
            }
            None => false,
        };
        if !stored {
            self.error(
                MessageCategory::StateSetting,
                format!(
                    "Root parameter {} is out of range of the bound {:?} root signature",
                    index, bind_point
                ),
            );
        }
    }

    fn set_root_constant(&mut self, bind_point: BindPoint, index: u32, value: u32, offset: u32) {
        let state = self.root_state(bind_point);
        let stored = match state.arguments.get_mut(index as usize) {
            Some(RootArgument::Constants(values)) => match values.get_mut(offset as usize) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        };
        if !stored {
            self.error(
                MessageCategory::StateSetting,
                format!(
                    "Root parameter {} cannot hold a 32-bit constant at offset {}",
                    index, offset
                ),
            );
        }
    }

    fn transition(&self, transitions: &[TransitionRecord]) {
        for transition in transitions {
            let mut state = lock(&transition.resource.inner.gpu_state);
            if *state != transition.before {
                self.error(
                    MessageCategory::ResourceManipulation,
                    format!(
                        "{:?} transitioned from {:?} but its current state is {:?}",
                        transition.resource, transition.before, *state
                    ),
                );
            }
            *state = transition.after;
        }
    }

    fn require_state(&self, resource: &Resource, required: ResourceStates, usage: &str) -> bool {
        let state = *lock(&resource.inner.gpu_state);
        let satisfied = if required == ResourceStates::Common {
            true
        } else {
            state.contains(required)
        };
        if !satisfied {
            self.error(
                MessageCategory::Execution,
                format!(
                    "{:?} is used as {} while in state {:?}, expected {:?}",
                    resource, usage, state, required
                ),
            );
        }
        satisfied
    }

    /// Copies may implicitly promote resources out of the common state
    fn require_copy_state(&self, resource: &Resource, required: ResourceStates, usage: &str) -> bool {
        if *lock(&resource.inner.gpu_state) == ResourceStates::Common {
            return true;
        }
        self.require_state(resource, required, usage)
    }

    fn clear_render_target(&self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        match self.device.resolve_descriptor(rtv.ptr) {
            Some(Descriptor::Rtv { resource, format }) => {
                if self.require_state(&resource, ResourceStates::RenderTarget, "a render target") {
                    fill(&resource, format, color);
                }
            }
            _ => self.error(
                MessageCategory::Execution,
                format!("ClearRenderTargetView: {:#x} is not a render target view", rtv.ptr),
            ),
        }
    }

    fn clear_depth_stencil(&self, dsv: CpuDescriptorHandle, depth: f32) {
        match self.device.resolve_descriptor(dsv.ptr) {
            Some(Descriptor::Dsv { resource, format }) => {
                if self.require_state(&resource, ResourceStates::DepthWrite, "a depth target") {
                    fill(&resource, format, [depth, 0., 0., 0.]);
                }
            }
            _ => self.error(
                MessageCategory::Execution,
                format!("ClearDepthStencilView: {:#x} is not a depth stencil view", dsv.ptr),
            ),
        }
    }

    fn copy_resource(&self, dest: &Resource, source: &Resource) {
        if !self.require_copy_state(dest, ResourceStates::CopyDest, "a copy destination")
            || !self.require_copy_state(source, ResourceStates::CopySource, "a copy source")
        {
            return;
        }
        let dest_layout = &dest.inner.layout;
        let source_layout = &source.inner.layout;
        if dest_layout.width != source_layout.width
            || dest_layout.height != source_layout.height
            || dest_layout.texel_size != source_layout.texel_size
        {
            self.error(
                MessageCategory::Execution,
                format!("CopyResource: {:?} and {:?} are not congruent", dest, source),
            );
            return;
        }
        // Staging through a packed copy keeps one memory lock at a time,
        // which matters when both views alias the same shared heap
        let packed = source_layout.read_packed(&source.inner.memory, source.inner.offset);
        dest_layout.write_packed(&dest.inner.memory, dest.inner.offset, &packed);
    }

    fn copy_texture_region(&self, dest: &TextureCopyLocation, source: &TextureCopyLocation) {
        if !self.require_copy_state(&dest.resource, ResourceStates::CopyDest, "a copy destination")
            || !self.require_copy_state(&source.resource, ResourceStates::CopySource, "a copy source")
        {
            return;
        }
        match (&dest.location, &source.location) {
            (TextureLocationType::SubresourceIndex(_), TextureLocationType::SubresourceIndex(_)) => {
                self.copy_resource(&dest.resource, &source.resource)
            }
            (
                TextureLocationType::SubresourceIndex(_),
                TextureLocationType::PlacedFootprint(footprint),
            ) => {
                let texture = &dest.resource;
                if !self.footprint_matches(texture, footprint) {
                    return;
                }
                let packed = read_footprint(&source.resource, footprint, &texture.inner.layout);
                texture
                    .inner
                    .layout
                    .write_packed(&texture.inner.memory, texture.inner.offset, &packed);
            }
            (
                TextureLocationType::PlacedFootprint(footprint),
                TextureLocationType::SubresourceIndex(_),
            ) => {
                let texture = &source.resource;
                if !self.footprint_matches(texture, footprint) {
                    return;
                }
                let packed = texture
                    .inner
                    .layout
                    .read_packed(&texture.inner.memory, texture.inner.offset);
                write_footprint(&dest.resource, footprint, &texture.inner.layout, &packed);
            }
            (TextureLocationType::PlacedFootprint(_), TextureLocationType::PlacedFootprint(_)) => {
                self.error(
                    MessageCategory::Execution,
                    String::from("CopyTextureRegion: buffer to buffer copies are not supported"),
                )
            }
        }
    }

    fn footprint_matches(&self, texture: &Resource, placed: &PlacedSubresourceFootprint) -> bool {
        let layout = &texture.inner.layout;
        let footprint = placed.footprint();
        let matches = footprint.width() == layout.width
            && footprint.height() == layout.height
            && u64::from(footprint.row_pitch()) >= layout.row_bytes();
        if !matches {
            self.error(
                MessageCategory::Execution,
                format!(
                    "CopyTextureRegion: footprint {}x{} does not describe {:?}",
                    footprint.width(),
                    footprint.height(),
                    texture
                ),
            );
        }
        matches
    }

    fn gather_bindings(
        &self,
        bind_point: BindPoint,
    ) -> Option<(ShaderBindings, Vec<(u32, Resource, DxgiFormat)>)> {
        let state = match bind_point {
            BindPoint::Graphics => &self.graphics,
            BindPoint::Compute => &self.compute,
        };
        let root_signature = match &state.root_signature {
            Some(root_signature) => root_signature,
            None => {
                self.error(
                    MessageCategory::Execution,
                    format!("No {:?} root signature is set", bind_point),
                );
                return None;
            }
        };

        let shader_state = match bind_point {
            BindPoint::Graphics => ResourceStates::PixelShaderResource,
            BindPoint::Compute => ResourceStates::NonPixelShaderResource,
        };

        let mut bindings = ShaderBindings {
            samplers: root_signature.inner.desc.static_samplers().to_vec(),
            ..ShaderBindings::default()
        };
        let mut uavs = vec![];

        for (index, (parameter, argument)) in root_signature
            .inner
            .desc
            .parameters()
            .iter()
            .zip(state.arguments.iter())
            .enumerate()
        {
            match (parameter.parameter_type(), argument) {
                (RootParameterType::Cbv, RootArgument::ConstantBuffer(address)) => {
                    let bytes = self.read_constant_buffer(*address, MAX_CONSTANT_BUFFER_VIEW_SIZE)?;
                    bindings
                        .constant_buffers
                        .push((parameter.descriptor().shader_register(), bytes));
                }
                (RootParameterType::Constants32Bit, RootArgument::Constants(values)) => {
                    bindings
                        .root_constants
                        .push((parameter.constants().shader_register(), values.clone()));
                }
                (RootParameterType::DescriptorTable, RootArgument::Table(base)) => {
                    if !self
                        .descriptor_heaps
                        .iter()
                        .any(|heap| heap.inner.id == base.ptr >> 32)
                    {
                        self.error(
                            MessageCategory::Execution,
                            format!(
                                "Descriptor table {} points into a heap that is not set on the command list",
                                index
                            ),
                        );
                        return None;
                    }
                    let mut next_offset = 0;
                    for range in parameter.descriptor_table().descriptor_ranges() {
                        let start = match range.offset_in_descriptors_from_table_start() {
                            DescriptorRangeOffset::Append => next_offset,
                            DescriptorRangeOffset::Offset(offset) => offset,
                        };
                        for i in 0..range.num_descriptors() {
                            let register = range.base_shader_register() + i;
                            let descriptor = self.device.resolve_descriptor(base.advance(start + i).ptr);
                            match (range.range_type(), descriptor) {
                                (
                                    DescriptorRangeType::Srv,
                                    Some(Descriptor::Srv { resource, format }),
                                ) => {
                                    if !self.require_state(&resource, shader_state, "a shader resource") {
                                        return None;
                                    }
                                    bindings
                                        .textures
                                        .push((register, decode_texture(&resource, format)));
                                }
                                (
                                    DescriptorRangeType::Uav,
                                    Some(Descriptor::Uav { resource, format }),
                                ) => {
                                    if !self.require_state(
                                        &resource,
                                        ResourceStates::UnorderedAccess,
                                        "an unordered access view",
                                    ) {
                                        return None;
                                    }
                                    uavs.push((register, resource, format));
                                }
                                (
                                    DescriptorRangeType::Cbv,
                                    Some(Descriptor::Cbv { address, size }),
                                ) => {
                                    let bytes = self.read_constant_buffer(address, size)?;
                                    bindings.constant_buffers.push((register, bytes));
                                }
                                (range_type, _) => {
                                    self.error(
                                        MessageCategory::Execution,
                                        format!(
                                            "Descriptor table {} slot {} does not hold a {:?} descriptor",
                                            index,
                                            start + i,
                                            range_type
                                        ),
                                    );
                                    return None;
                                }
                            }
                        }
                        next_offset = start + range.num_descriptors();
                    }
                }
                (parameter_type, _) => {
                    self.error(
                        MessageCategory::Execution,
                        format!(
                            "Root parameter {} ({:?}) is not set before the {:?} call",
                            index, parameter_type, bind_point
                        ),
                    );
                    return None;
                }
            }
        }
        Some((bindings, uavs))
    }

    fn read_constant_buffer(&self, address: GpuVirtualAddress, size: Bytes) -> Option<Vec<u8>> {
        match self.device.resolve_gpu_address(address) {
            Some((resource, offset)) => {
                let available = resource.inner.layout.size - offset;
                let len = available.min(size.0);
                Some(resource.inner.memory.read(resource.inner.offset + offset, len))
            }
            None => {
                self.error(
                    MessageCategory::Execution,
                    format!("GPU address {:#x} does not belong to a live buffer", address.0),
                );
                None
            }
        }
    }

    fn bound_pipeline(&self, bind_point: BindPoint) -> Option<PipelineState> {
        let pipeline_state = match &self.pipeline_state {
            Some(pipeline_state) => pipeline_state.clone(),
            None => {
                self.error(
                    MessageCategory::Execution,
                    format!("{:?} call without a pipeline state", bind_point),
                );
                return None;
            }
        };
        let bound_root_signature = match bind_point {
            BindPoint::Graphics => &self.graphics.root_signature,
            BindPoint::Compute => &self.compute.root_signature,
        };
        let compatible = bound_root_signature
            .as_ref()
            .map_or(false, |bound| {
                Arc::ptr_eq(&bound.inner, &pipeline_state.inner.root_signature.inner)
            });
        if !compatible {
            self.error(
                MessageCategory::Execution,
                format!(
                    "The {:?} root signature does not match the one pipeline state '{}' was created with",
                    bind_point,
                    pipeline_state.shader_name()
                ),
            );
            return None;
        }
        Some(pipeline_state)
    }

    fn draw(&self) {
        let pipeline_state = match self.bound_pipeline(BindPoint::Graphics) {
            Some(pipeline_state) => pipeline_state,
            None => return,
        };
        let (shader, depth_stencil_state, rtv_formats, dsv_format) = match &pipeline_state.inner.kind {
            PipelineKind::Graphics {
                pixel_shader,
                depth_stencil_state,
                rtv_formats,
                dsv_format,
            } => (pixel_shader, *depth_stencil_state, rtv_formats, *dsv_format),
            PipelineKind::Compute { .. } => {
                self.error(
                    MessageCategory::Execution,
                    String::from("DrawInstanced with a compute pipeline state"),
                );
                return;
            }
        };
        let viewport = match self.viewport {
            Some(viewport) => viewport,
            None => {
                self.error(MessageCategory::Execution, String::from("DrawInstanced without a viewport"));
                return;
            }
        };

        let color_target = match self.render_targets.first() {
            Some(rtv) => match self.device.resolve_descriptor(rtv.ptr) {
                Some(Descriptor::Rtv { resource, format }) => {
                    if !self.require_state(&resource, ResourceStates::RenderTarget, "a render target") {
                        return;
                    }
                    Some((resource, format))
                }
                _ => {
                    self.error(MessageCategory::Execution, String::from("Bound render target view is invalid"));
                    return;
                }
            },
            None => None,
        };
        let depth_target = match self.depth_stencil {
            Some(dsv) => match self.device.resolve_descriptor(dsv.ptr) {
                Some(Descriptor::Dsv { resource, format }) => {
                    if !self.require_state(&resource, ResourceStates::DepthWrite, "a depth target") {
                        return;
                    }
                    Some((resource, format))
                }
                _ => {
                    self.error(MessageCategory::Execution, String::from("Bound depth stencil view is invalid"));
                    return;
                }
            },
            None => None,
        };

        let color_format = color_target.as_ref().map(|(_, format)| *format);
        let depth_format = depth_target.as_ref().map(|(_, format)| *format);
        if color_format != rtv_formats.first().copied()
            || depth_format.unwrap_or(DxgiFormat::Unknown) != dsv_format
        {
            self.error(
                MessageCategory::Execution,
                format!(
                    "Bound targets ({:?}, {:?}) do not match the formats pipeline state '{}' was created with",
                    color_format,
                    depth_format,
                    pipeline_state.shader_name()
                ),
            );
            return;
        }

        let (target_width, target_height) = match (&color_target, &depth_target) {
            (Some((resource, _)), _) | (None, Some((resource, _))) => {
                (resource.inner.layout.width, resource.inner.layout.height)
            }
            (None, None) => {
                self.error(MessageCategory::Execution, String::from("DrawInstanced without any render target"));
                return;
            }
        };

        let bindings = match self.gather_bindings(BindPoint::Graphics) {
            Some((bindings, _)) => bindings,
            None => return,
        };

        let mut left = viewport.top_left_x().max(0.) as i64;
        let mut top = viewport.top_left_y().max(0.) as i64;
        let mut right = ((viewport.top_left_x() + viewport.width()) as i64).min(i64::from(target_width));
        let mut bottom = ((viewport.top_left_y() + viewport.height()) as i64).min(i64::from(target_height));
        if let Some(scissor) = self.scissor_rect {
            left = left.max(i64::from(scissor.left()));
            top = top.max(i64::from(scissor.top()));
            right = right.min(i64::from(scissor.right()));
            bottom = bottom.min(i64::from(scissor.bottom()));
        }
        if left >= right || top >= bottom {
            return;
        }

        let mut color_texels = color_target
            .as_ref()
            .map(|(resource, format)| decode_texture(resource, *format));
        let mut depth_texels = depth_target
            .as_ref()
            .map(|(resource, format)| decode_texture(resource, *format));

        trace!(
            "Shading {}x{} pixels with '{}'",
            right - left,
            bottom - top,
            shader.name()
        );
        let context = ShaderContext::new(&bindings);
        for y in top..bottom {
            for x in left..right {
                let position = [x as f32 + 0.5, y as f32 + 0.5];
                let input = PixelInput {
                    position,
                    tex_coord: [
                        (position[0] - viewport.top_left_x()) / viewport.width(),
                        (position[1] - viewport.top_left_y()) / viewport.height(),
                    ],
                };
                let output = shader.shade(&context, &input);

                if let (Some(depth_view), true) =
                    (depth_texels.as_mut(), depth_stencil_state.depth_enable())
                {
                    let incoming = output.depth.unwrap_or(0.);
                    let stored = depth_view.load(x as i32, y as i32)[0];
                    if !depth_stencil_state.depth_func().passes(incoming, stored) {
                        continue;
                    }
                    if depth_stencil_state.depth_write() {
                        depth_view.store(x as u32, y as u32, [incoming, 0., 0., 0.]);
                    }
                }
                if let Some(color_view) = color_texels.as_mut() {
                    color_view.store(x as u32, y as u32, output.color);
                }
            }
        }

        if let (Some((resource, format)), Some(view)) = (color_target, color_texels) {
            encode_texture(&resource, format, view);
        }
        if let (Some((resource, format)), Some(view)) = (depth_target, depth_texels) {
            if depth_stencil_state.depth_write() {
                encode_texture(&resource, format, view);
            }
        }
    }

    fn dispatch(&self, groups: [u32; 3]) {
        let pipeline_state = match self.bound_pipeline(BindPoint::Compute) {
            Some(pipeline_state) => pipeline_state,
            None => return,
        };
        let shader = match &pipeline_state.inner.kind {
            PipelineKind::Compute { compute_shader } => compute_shader,
            PipelineKind::Graphics { .. } => {
                self.error(
                    MessageCategory::Execution,
                    String::from("Dispatch with a graphics pipeline state"),
                );
                return;
            }
        };
        let (bindings, uav_targets) = match self.gather_bindings(BindPoint::Compute) {
            Some(gathered) => gathered,
            None => return,
        };

        let mut uavs: Vec<(u32, TextureView)> = uav_targets
            .iter()
            .map(|(register, resource, format)| (*register, decode_texture(resource, *format)))
            .collect();
        let group_size = shader.thread_group_size();
        trace!(
            "Dispatching {:?} groups of {:?} threads with '{}'",
            groups,
            group_size,
            shader.name()
        );
        {
            let mut context = ComputeContext::new(&bindings, &mut uavs[..]);
            for group_z in 0..groups[2] {
                for group_y in 0..groups[1] {
                    for group_x in 0..groups[0] {
                        for thread_z in 0..group_size[2] {
                            for thread_y in 0..group_size[1] {
                                for thread_x in 0..group_size[0] {
                                    shader.execute(
                                        &mut context,
                                        [
                                            group_x * group_size[0] + thread_x,
                                            group_y * group_size[1] + thread_y,
                                            group_z * group_size[2] + thread_z,
                                        ],
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
        for ((_, view), (_, resource, format)) in uavs.into_iter().zip(uav_targets) {
            encode_texture(&resource, format, view);
        }
    }
}

fn decode_texture(resource: &Resource, format: DxgiFormat) -> TextureView {
    let layout = &resource.inner.layout;
    let packed = layout.read_packed(&resource.inner.memory, resource.inner.offset);
    let texels = packed
        .chunks(layout.texel_size as usize)
        .map(|bytes| decode_texel(format, bytes))
        .collect();
    TextureView::new(layout.width, layout.height, texels)
}

fn encode_texture(resource: &Resource, format: DxgiFormat, view: TextureView) {
    let layout = &resource.inner.layout;
    let texel_size = layout.texel_size as usize;
    let mut packed = vec![0; texel_size * view.texels().len()];
    for (texel, bytes) in view.into_texels().into_iter().zip(packed.chunks_mut(texel_size)) {
        encode_texel(format, texel, bytes);
    }
    layout.write_packed(&resource.inner.memory, resource.inner.offset, &packed);
}

fn fill(resource: &Resource, format: DxgiFormat, value: [f32; 4]) {
    let layout = &resource.inner.layout;
    let view = TextureView::filled(layout.width, layout.height, value);
    encode_texture(resource, format, view);
}

fn read_footprint(
    buffer: &Resource,
    placed: &PlacedSubresourceFootprint,
    texture_layout: &super::memory::SubresourceLayout,
) -> Vec<u8> {
    let row_bytes = texture_layout.row_bytes();
    let row_pitch = u64::from(placed.footprint().row_pitch());
    let mut packed = Vec::with_capacity((row_bytes * u64::from(texture_layout.height)) as usize);
    for row in 0..u64::from(texture_layout.height) {
        let offset = buffer.inner.offset + placed.offset() + row * row_pitch;
        packed.extend(buffer.inner.memory.read(offset, row_bytes));
    }
    packed
}

fn write_footprint(
    buffer: &Resource,
    placed: &PlacedSubresourceFootprint,
    texture_layout: &super::memory::SubresourceLayout,
    packed: &[u8],
) {
    let row_bytes = texture_layout.row_bytes() as usize;
    let row_pitch = u64::from(placed.footprint().row_pitch());
    for (row, bytes) in packed.chunks(row_bytes).enumerate() {
        let offset = buffer.inner.offset + placed.offset() + row as u64 * row_pitch;
        buffer.inner.memory.write(offset, bytes);
    }
}
