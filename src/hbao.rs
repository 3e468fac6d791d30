//! Horizon-based ambient occlusion as a single compute pass.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use cgmath::prelude::*;

use crate::ao_resources::{
    AoResourceSet, DevicePairResources, DeviceRole, HbaoResources, AMBIENT_MAP_CLEAR,
};
use crate::config::AoConfig;
use crate::cross_adapter::CrossAdapterResourceSet;
use crate::error::{AoError, AoResult};
use crate::math::{self, Camera, Vec3};
use crate::queue::GpuDevice;
use crate::shader::{ComputeContext, ComputeShader};
use crate::ssao::AmbientOcclusionEngine;
use crate::*;

pub const HBAO_GROUP_SIZE: u32 = 32;
const DIRECTIONS: u32 = 8;
const STEPS: u32 = 4;
const TANGENT_BIAS: f32 = 0.1;

// Registers of the HBAO root signature
const DEPTH_MAP: u32 = 0;
const RANDOM_MAP: u32 = 1;
const AMBIENT_MAP: u32 = 0;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct HbaoConstants {
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    /// width, height, 1 / width, 1 / height
    pub resolution: [f32; 4],
    /// near and far plane distances
    pub clip_info: [f32; 2],
    pub trace_radius: f32,
    pub max_radius_pixels: f32,
    pub discard_distance: f32,
    pub padding: [f32; 3],
}

const_assert_eq!(std::mem::size_of::<HbaoConstants>(), 176);

impl HbaoConstants {
    pub fn new(camera: &Camera, width: u32, height: u32, config: &AoConfig) -> AoResult<Self> {
        let proj = camera.projection();
        let inv_proj = proj
            .invert()
            .ok_or_else(|| AoError::Config(String::from("projection matrix is singular")))?;
        Ok(Self {
            proj: math::to_array(&proj),
            inv_proj: math::to_array(&inv_proj),
            resolution: [
                width as f32,
                height as f32,
                1. / width as f32,
                1. / height as f32,
            ],
            clip_info: [camera.near, camera.far],
            trace_radius: config.hbao_trace_radius,
            max_radius_pixels: config.hbao_max_radius_pixels,
            discard_distance: config.hbao_discard_distance,
            padding: [0.; 3],
        })
    }

    fn view_depth(&self, ndc_depth: f32) -> f32 {
        let [near, far] = self.clip_info;
        near * far / (far - ndc_depth * (far - near))
    }
}

/// Marches a few directions around every pixel over the depth buffer and
/// accumulates how far the horizon rises above the pixel
pub struct HbaoComputeShader;

impl HbaoComputeShader {
    fn view_position(constants: &HbaoConstants, context: &ComputeContext<'_>, x: i32, y: i32) -> Vec3 {
        let inv_proj = math::from_array(&constants.inv_proj);
        let uv = [
            (x as f32 + 0.5) * constants.resolution[2],
            (y as f32 + 0.5) * constants.resolution[3],
        ];
        let view_z = constants.view_depth(context.load(DEPTH_MAP, x, y)[0]);
        let near_position = math::near_plane_position(&inv_proj, uv);
        near_position * (view_z / near_position.z)
    }
}

impl ComputeShader for HbaoComputeShader {
    fn name(&self) -> &str {
        "HBAO"
    }

    fn thread_group_size(&self) -> [u32; 3] {
        [HBAO_GROUP_SIZE, HBAO_GROUP_SIZE, 1]
    }

    fn execute(&self, context: &mut ComputeContext<'_>, dispatch_thread_id: [u32; 3]) {
        let [width, height] = context.uav_size(AMBIENT_MAP);
        let (x, y) = (dispatch_thread_id[0], dispatch_thread_id[1]);
        if x >= width || y >= height {
            return;
        }
        let constants: HbaoConstants = context.constants(0);
        let ndc_depth = context.load(DEPTH_MAP, x as i32, y as i32)[0];
        let view_z = constants.view_depth(ndc_depth);
        if view_z > constants.discard_distance {
            context.store(AMBIENT_MAP, x, y, AMBIENT_MAP_CLEAR);
            return;
        }

        let p = Self::view_position(&constants, context, x as i32, y as i32);
        let proj_scale = constants.proj[0][0] * 0.5 * constants.resolution[0];
        let radius_pixels =
            (constants.trace_radius * proj_scale / view_z).min(constants.max_radius_pixels);
        if radius_pixels < 1. {
            context.store(AMBIENT_MAP, x, y, AMBIENT_MAP_CLEAR);
            return;
        }

        let [random_width, random_height] = context.texture_size(RANDOM_MAP);
        let jitter = if random_width > 0 && random_height > 0 {
            context.load(
                RANDOM_MAP,
                (x % random_width) as i32,
                (y % random_height) as i32,
            )
        } else {
            [0.; 4]
        };
        let step_pixels = radius_pixels / STEPS as f32;
        let radius2 = constants.trace_radius * constants.trace_radius;

        let mut occlusion = 0.;
        for direction in 0..DIRECTIONS {
            let angle = (direction as f32 + jitter[0]) * 2. * PI / DIRECTIONS as f32;
            let (sin, cos) = angle.sin_cos();
            let mut max_sin = TANGENT_BIAS;
            for step in 0..STEPS {
                let distance = (step as f32 + 0.5 + 0.5 * jitter[1]) * step_pixels;
                let sample_x = (x as f32 + cos * distance).round() as i32;
                let sample_y = (y as f32 + sin * distance).round() as i32;
                if sample_x < 0
                    || sample_y < 0
                    || sample_x >= width as i32
                    || sample_y >= height as i32
                {
                    break;
                }
                let sample = Self::view_position(&constants, context, sample_x, sample_y);
                let to_sample = sample - p;
                let distance2 = to_sample.magnitude2();
                if distance2 == 0. || distance2 > radius2 {
                    continue;
                }
                // Occluders are closer to the camera, so their z is smaller
                let sin_horizon = (p.z - sample.z) / distance2.sqrt();
                if sin_horizon > max_sin {
                    occlusion += (sin_horizon - max_sin) * (1. - distance2 / radius2);
                    max_sin = sin_horizon;
                }
            }
        }

        let ambient = (1. - occlusion / DIRECTIONS as f32).max(0.).min(1.);
        context.store(AMBIENT_MAP, x, y, [ambient; 4]);
    }
}

#[derive(Default)]
pub struct SharedHbao {
    resources: DevicePairResources<HbaoResources>,
}

fn int_div_round_up(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

impl SharedHbao {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hbao(
        list: &mut CommandList,
        constants: GpuVirtualAddress,
        resources: &HbaoResources,
    ) -> AoResult<()> {
        let maps = resources.maps()?;
        let views = resources.views()?;
        let ambient_uav = views
            .ambient_uav
            .ok_or(AoError::NotInitialized("HBAO ambient map UAV"))?;
        let (width, height) = resources.size();

        list.transition_barrier(&maps.ambient[0], ResourceStates::RenderTarget);
        list.flush_resource_barriers();
        list.clear_render_target_view(views.ambient_rtv[0], AMBIENT_MAP_CLEAR);

        list.transition_barrier(&maps.depth, ResourceStates::NonPixelShaderResource);
        list.transition_barrier(&maps.random, ResourceStates::AllShaderResource);
        list.transition_barrier(&maps.ambient[0], ResourceStates::UnorderedAccess);
        list.flush_resource_barriers();

        list.set_compute_root_signature(resources.root_signature()?);
        list.set_pipeline_state(resources.pso()?);
        list.set_descriptor_heaps(&[views.srv_heap.clone()]);
        list.set_compute_root_constant_buffer_view(0, constants);
        list.set_compute_root_descriptor_table(1, views.depth_srv);
        list.set_compute_root_descriptor_table(2, views.random_srv);
        list.set_compute_root_descriptor_table(3, ambient_uav);
        list.dispatch(
            int_div_round_up(width, HBAO_GROUP_SIZE),
            int_div_round_up(height, HBAO_GROUP_SIZE),
            1,
        );

        list.transition_barrier(&maps.ambient[0], ResourceStates::PixelShaderResource);
        list.flush_resource_barriers();
        Ok(())
    }
}

impl AmbientOcclusionEngine for SharedHbao {
    fn name(&self) -> &'static str {
        "HBAO"
    }

    fn initialize(
        &mut self,
        prime: &GpuDevice,
        second: &GpuDevice,
        input_layout: &InputLayoutDesc,
        width: u32,
        height: u32,
    ) -> AoResult<()> {
        self.resources
            .initialize(prime, second, input_layout, width, height)
    }

    fn on_resize(&mut self, width: u32, height: u32) -> AoResult<bool> {
        self.resources.on_resize(width, height)
    }

    fn resources(&self, role: DeviceRole) -> &dyn AoResourceSet {
        self.resources.get(role)
    }

    fn cross_resources(&self) -> &CrossAdapterResourceSet {
        self.resources.cross()
    }

    /// The horizon pass needs no blur, `blur_count` is ignored
    fn compute(
        &self,
        list: &mut CommandList,
        constants: GpuVirtualAddress,
        role: DeviceRole,
        _blur_count: u32,
    ) -> AoResult<()> {
        Self::compute_hbao(list, constants, self.resources.get(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_buffer_layout() {
        assert_eq!(memoffset::offset_of!(HbaoConstants, inv_proj), 64);
        assert_eq!(memoffset::offset_of!(HbaoConstants, resolution), 128);
        assert_eq!(memoffset::offset_of!(HbaoConstants, clip_info), 144);
        assert_eq!(memoffset::offset_of!(HbaoConstants, trace_radius), 152);
        assert_eq!(memoffset::offset_of!(HbaoConstants, max_radius_pixels), 156);
        assert_eq!(memoffset::offset_of!(HbaoConstants, discard_distance), 160);
    }

    #[test]
    fn clip_info_linearizes_depth() {
        let camera = Camera::default();
        let constants =
            HbaoConstants::new(&camera, 64, 64, &AoConfig::default()).expect("Cannot build constants");
        assert!((constants.view_depth(0.) - camera.near).abs() < 1e-4);
        assert!((constants.view_depth(1.) - camera.far).abs() < 1e-1);

        let proj = camera.projection();
        let ndc = 0.9;
        let expected = math::ndc_depth_to_view_depth(&proj, ndc);
        assert!((constants.view_depth(ndc) - expected).abs() / expected < 1e-4);
    }

    #[test]
    fn dispatch_covers_partial_groups() {
        assert_eq!(int_div_round_up(64, HBAO_GROUP_SIZE), 2);
        assert_eq!(int_div_round_up(65, HBAO_GROUP_SIZE), 3);
        assert_eq!(int_div_round_up(1, HBAO_GROUP_SIZE), 1);
    }
}
