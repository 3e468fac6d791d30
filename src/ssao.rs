//! Screen-space ambient occlusion: a full-screen occlusion pass followed by
//! an edge-preserving separable blur, run on either device.

use bytemuck::{Pod, Zeroable};
use cgmath::prelude::*;

use crate::ao_resources::{
    full_screen_viewport, AoResourceSet, DevicePairResources, DeviceRole, SsaoResources,
    AMBIENT_MAP_CLEAR, OFFSET_VECTOR_COUNT,
};
use crate::config::AoConfig;
use crate::cross_adapter::CrossAdapterResourceSet;
use crate::error::{AoError, AoResult};
use crate::math::{self, Mat4, Vec3, Vec4};
use crate::queue::GpuDevice;
use crate::shader::{PixelInput, PixelOutput, PixelShader, ShaderContext};
use crate::*;

pub const MAX_BLUR_RADIUS: u32 = 5;
const BLUR_WEIGHT_VECTORS: usize = 3;

// Registers of the SSAO root signature
const NORMAL_MAP: u32 = 0;
const DEPTH_MAP: u32 = 1;
const RANDOM_MAP: u32 = 2;
const BLUR_INPUT_MAP: u32 = 2;
const POINT_CLAMP: u32 = 0;
const DEPTH_SAMPLER: u32 = 2;
const LINEAR_WRAP: u32 = 3;

pub fn blur_radius(sigma: f32) -> u32 {
    (2. * sigma).ceil() as u32
}

/// Normalized Gaussian weights for a blur of `2 * ceil(2 * sigma) + 1` taps
pub fn calc_gauss_weights(sigma: f32) -> AoResult<Vec<f32>> {
    if !sigma.is_finite() || sigma <= 0. {
        return Err(AoError::Config(format!(
            "blur sigma {} must be positive and finite",
            sigma
        )));
    }
    let radius = blur_radius(sigma);
    if radius > MAX_BLUR_RADIUS {
        return Err(AoError::BlurRadius {
            radius,
            max: MAX_BLUR_RADIUS,
        });
    }
    let two_sigma2 = 2. * sigma * sigma;
    let radius = radius as i32;
    let mut weights: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / two_sigma2).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    for weight in weights.iter_mut() {
        *weight /= sum;
    }
    Ok(weights)
}

/// Packs up to 12 weights into the float4 array the blur shader reads
pub fn pack_blur_weights(weights: &[f32]) -> [[f32; 4]; BLUR_WEIGHT_VECTORS] {
    let mut packed = [[0.; 4]; BLUR_WEIGHT_VECTORS];
    for (index, weight) in weights.iter().take(4 * BLUR_WEIGHT_VECTORS).enumerate() {
        packed[index / 4][index % 4] = *weight;
    }
    packed
}

fn unpack_blur_weights(packed: &[[f32; 4]; BLUR_WEIGHT_VECTORS], index: usize) -> f32 {
    packed[index / 4][index % 4]
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SsaoConstants {
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub proj_tex: [[f32; 4]; 4],
    pub offset_vectors: [[f32; 4]; OFFSET_VECTOR_COUNT],
    pub blur_weights: [[f32; 4]; BLUR_WEIGHT_VECTORS],
    pub inv_render_target_size: [f32; 2],
    pub occlusion_radius: f32,
    pub occlusion_fade_start: f32,
    pub occlusion_fade_end: f32,
    pub surface_epsilon: f32,
    pub blur_radius: u32,
    pub padding: [u32; 5],
}

const_assert_eq!(std::mem::size_of::<SsaoConstants>(), 512);

impl SsaoConstants {
    pub fn new(
        proj: &Mat4,
        width: u32,
        height: u32,
        config: &AoConfig,
        offset_vectors: &[[f32; 4]; OFFSET_VECTOR_COUNT],
    ) -> AoResult<Self> {
        let inv_proj = proj
            .invert()
            .ok_or_else(|| AoError::Config(String::from("projection matrix is singular")))?;
        let weights = calc_gauss_weights(config.blur_sigma)?;
        Ok(Self {
            proj: math::to_array(proj),
            inv_proj: math::to_array(&inv_proj),
            proj_tex: math::to_array(&(math::texture_transform() * *proj)),
            offset_vectors: *offset_vectors,
            blur_weights: pack_blur_weights(&weights),
            inv_render_target_size: [1. / width as f32, 1. / height as f32],
            occlusion_radius: config.occlusion_radius,
            occlusion_fade_start: config.occlusion_fade_start,
            occlusion_fade_end: config.occlusion_fade_end,
            surface_epsilon: config.surface_epsilon,
            blur_radius: blur_radius(config.blur_sigma),
            padding: [0; 5],
        })
    }
}

fn xyz(texel: [f32; 4]) -> Vec3 {
    Vec3::new(texel[0], texel[1], texel[2])
}

fn sign(value: f32) -> f32 {
    if value > 0. {
        1.
    } else if value < 0. {
        -1.
    } else {
        0.
    }
}

fn saturate(value: f32) -> f32 {
    value.max(0.).min(1.)
}

fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - normal * (2. * incident.dot(normal))
}

fn occlusion(constants: &SsaoConstants, dist_z: f32) -> f32 {
    if dist_z > constants.surface_epsilon {
        let fade_length = constants.occlusion_fade_end - constants.occlusion_fade_start;
        saturate((constants.occlusion_fade_end - dist_z) / fade_length)
    } else {
        0.
    }
}

/// Estimates how much of the hemisphere above each pixel is blocked by
/// nearby geometry, using the view-space normal and depth maps
pub struct SsaoPixelShader;

impl PixelShader for SsaoPixelShader {
    fn name(&self) -> &str {
        "SSAO"
    }

    fn shade(&self, context: &ShaderContext<'_>, input: &PixelInput) -> PixelOutput {
        let constants: SsaoConstants = context.constants(0);
        let proj = math::from_array(&constants.proj);
        let inv_proj = math::from_array(&constants.inv_proj);
        let proj_tex = math::from_array(&constants.proj_tex);
        let uv = input.tex_coord;

        let normal = xyz(context.sample_level(NORMAL_MAP, POINT_CLAMP, uv)).normalize();
        let pz = math::ndc_depth_to_view_depth(
            &proj,
            context.sample_level(DEPTH_MAP, DEPTH_SAMPLER, uv)[0],
        );
        let near_position = math::near_plane_position(&inv_proj, uv);
        let p = near_position * (pz / near_position.z);

        let random = xyz(context.sample_level(RANDOM_MAP, LINEAR_WRAP, [4. * uv[0], 4. * uv[1]]))
            * 2.
            - Vec3::new(1., 1., 1.);

        let mut occlusion_sum = 0.;
        for offset in constants.offset_vectors.iter() {
            let offset = reflect(xyz(*offset), random);
            let flip = sign(offset.dot(normal));
            let q = p + offset * (flip * constants.occlusion_radius);

            let projected: Vec4 = proj_tex * q.extend(1.);
            let projected_uv = [projected.x / projected.w, projected.y / projected.w];
            let rz = math::ndc_depth_to_view_depth(
                &proj,
                context.sample_level(DEPTH_MAP, DEPTH_SAMPLER, projected_uv)[0],
            );
            let r = q * (rz / q.z);

            let dist_z = p.z - r.z;
            let to_r = r - p;
            let dp = if to_r.magnitude2() > 0. {
                normal.dot(to_r.normalize()).max(0.)
            } else {
                0.
            };
            occlusion_sum += dp * occlusion(&constants, dist_z);
        }

        let access = 1. - occlusion_sum / OFFSET_VECTOR_COUNT as f32;
        let ambient = saturate(access.powi(6));
        PixelOutput {
            color: [ambient; 4],
            depth: None,
        }
    }
}

/// One direction of the bilateral blur. Neighbours across a normal or
/// depth discontinuity do not contribute.
pub struct SsaoBlurShader;

impl PixelShader for SsaoBlurShader {
    fn name(&self) -> &str {
        "SSAO blur"
    }

    fn shade(&self, context: &ShaderContext<'_>, input: &PixelInput) -> PixelOutput {
        let constants: SsaoConstants = context.constants(0);
        let proj = math::from_array(&constants.proj);
        let horizontal = context.root_constant(1, 0) != 0;
        let radius = constants.blur_radius.min(MAX_BLUR_RADIUS) as i32;
        let uv = input.tex_coord;
        let step = if horizontal {
            [constants.inv_render_target_size[0], 0.]
        } else {
            [0., constants.inv_render_target_size[1]]
        };

        let center_weight = unpack_blur_weights(&constants.blur_weights, radius as usize);
        let mut color = context.sample_level(BLUR_INPUT_MAP, POINT_CLAMP, uv)[0] * center_weight;
        let mut total_weight = center_weight;

        let center_normal = xyz(context.sample_level(NORMAL_MAP, POINT_CLAMP, uv));
        let center_depth = math::ndc_depth_to_view_depth(
            &proj,
            context.sample_level(DEPTH_MAP, DEPTH_SAMPLER, uv)[0],
        );

        for i in -radius..=radius {
            if i == 0 {
                continue;
            }
            let tex = [uv[0] + i as f32 * step[0], uv[1] + i as f32 * step[1]];
            let neighbor_normal = xyz(context.sample_level(NORMAL_MAP, POINT_CLAMP, tex));
            let neighbor_depth = math::ndc_depth_to_view_depth(
                &proj,
                context.sample_level(DEPTH_MAP, DEPTH_SAMPLER, tex)[0],
            );
            if neighbor_normal.dot(center_normal) >= 0.8
                && (neighbor_depth - center_depth).abs() <= 0.2
            {
                let weight = unpack_blur_weights(&constants.blur_weights, (i + radius) as usize);
                color += weight * context.sample_level(BLUR_INPUT_MAP, POINT_CLAMP, tex)[0];
                total_weight += weight;
            }
        }

        let ambient = if total_weight > 0. {
            color / total_weight
        } else {
            color
        };
        PixelOutput {
            color: [ambient; 4],
            depth: None,
        }
    }
}

/// Common surface of the SSAO and HBAO engines: one resource set per
/// device plus the shared maps between them
pub trait AmbientOcclusionEngine {
    fn name(&self) -> &'static str;

    fn initialize(
        &mut self,
        prime: &GpuDevice,
        second: &GpuDevice,
        input_layout: &InputLayoutDesc,
        width: u32,
        height: u32,
    ) -> AoResult<()>;

    /// Resizes both resource sets and then the shared maps. Returns
    /// whether anything was recreated.
    fn on_resize(&mut self, width: u32, height: u32) -> AoResult<bool>;

    fn resources(&self, role: DeviceRole) -> &dyn AoResourceSet;

    fn cross_resources(&self) -> &CrossAdapterResourceSet;

    /// Records the occlusion pass on `role`'s resources. Expects the normal
    /// and depth maps rendered; leaves the result in ambient map 0 in the
    /// pixel shader resource state.
    fn compute(
        &self,
        list: &mut CommandList,
        constants: GpuVirtualAddress,
        role: DeviceRole,
        blur_count: u32,
    ) -> AoResult<()>;
}

#[derive(Default)]
pub struct SharedSsao {
    resources: DevicePairResources<SsaoResources>,
}

impl SharedSsao {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_ssao(
        list: &mut CommandList,
        constants: GpuVirtualAddress,
        resources: &SsaoResources,
        blur_count: u32,
    ) -> AoResult<()> {
        let maps = resources.maps()?;
        let views = resources.views()?;
        let (width, height) = resources.size();
        let (viewport, scissor) = full_screen_viewport(width, height);

        list.transition_barrier(&maps.normal, ResourceStates::PixelShaderResource);
        list.transition_barrier(&maps.depth, ResourceStates::PixelShaderResource);
        list.transition_barrier(&maps.ambient[0], ResourceStates::RenderTarget);
        list.flush_resource_barriers();
        list.clear_render_target_view(views.ambient_rtv[0], AMBIENT_MAP_CLEAR);

        list.set_viewports(&[viewport]);
        list.set_scissor_rects(&[scissor]);
        list.set_render_targets(&[views.ambient_rtv[0]], None);

        list.set_graphics_root_signature(resources.root_signature()?);
        list.set_pipeline_state(resources.pso()?);
        list.set_descriptor_heaps(&[views.srv_heap.clone()]);
        list.set_graphics_root_constant_buffer_view(0, constants);
        list.set_graphics_root_32bit_constant(1, 0, 0);
        list.set_graphics_root_descriptor_table(2, views.normal_srv);
        list.set_graphics_root_descriptor_table(3, views.random_srv);
        list.draw_instanced(6, 1, 0, 0);

        list.transition_barrier(&maps.ambient[0], ResourceStates::PixelShaderResource);
        list.flush_resource_barriers();

        Self::blur_ambient_map(list, constants, resources, blur_count)
    }

    /// Ping-pongs ambient map 0 through map 1 `blur_count` times, one
    /// horizontal and one vertical pass each
    pub fn blur_ambient_map(
        list: &mut CommandList,
        constants: GpuVirtualAddress,
        resources: &SsaoResources,
        blur_count: u32,
    ) -> AoResult<()> {
        if blur_count == 0 {
            return Ok(());
        }
        let views = resources.views()?;
        let (width, height) = resources.size();
        let (viewport, scissor) = full_screen_viewport(width, height);

        list.set_viewports(&[viewport]);
        list.set_scissor_rects(&[scissor]);
        list.set_graphics_root_signature(resources.root_signature()?);
        list.set_pipeline_state(resources.blur_pso()?);
        list.set_descriptor_heaps(&[views.srv_heap.clone()]);
        list.set_graphics_root_constant_buffer_view(0, constants);
        list.set_graphics_root_descriptor_table(2, views.normal_srv);

        for _ in 0..blur_count {
            Self::blur_pass(list, resources, true)?;
            Self::blur_pass(list, resources, false)?;
        }
        Ok(())
    }

    fn blur_pass(
        list: &mut CommandList,
        resources: &SsaoResources,
        horizontal: bool,
    ) -> AoResult<()> {
        let maps = resources.maps()?;
        let views = resources.views()?;
        let (input, output) = if horizontal { (0, 1) } else { (1, 0) };

        list.transition_barrier(&maps.ambient[output], ResourceStates::RenderTarget);
        list.flush_resource_barriers();
        list.clear_render_target_view(views.ambient_rtv[output], AMBIENT_MAP_CLEAR);
        list.set_render_targets(&[views.ambient_rtv[output]], None);

        list.set_graphics_root_32bit_constant(1, horizontal as u32, 0);
        list.set_graphics_root_descriptor_table(3, views.ambient_srv[input]);
        list.draw_instanced(6, 1, 0, 0);

        list.transition_barrier(&maps.ambient[output], ResourceStates::PixelShaderResource);
        list.flush_resource_barriers();
        Ok(())
    }
}

impl AmbientOcclusionEngine for SharedSsao {
    fn name(&self) -> &'static str {
        "SSAO"
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

    fn compute(
        &self,
        list: &mut CommandList,
        constants: GpuVirtualAddress,
        role: DeviceRole,
        blur_count: u32,
    ) -> AoResult<()> {
        Self::compute_ssao(list, constants, self.resources.get(role), blur_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauss_weights_are_normalized() {
        for &sigma in &[0.5f32, 1.0, 2.0, 2.5] {
            let weights = calc_gauss_weights(sigma).expect("Radius in range");
            assert_eq!(weights.len(), 2 * blur_radius(sigma) as usize + 1);
            let sum: f32 = weights.iter().sum();
            assert!((sum - 1.).abs() <= 1e-5, "sigma {}: sum {}", sigma, sum);
            let center = weights.len() / 2;
            assert!(weights.iter().all(|weight| *weight <= weights[center]));
        }
    }

    #[test]
    fn wide_gauss_kernel_is_rejected() {
        assert!(matches!(
            calc_gauss_weights(2.6),
            Err(AoError::BlurRadius { radius: 6, max: 5 })
        ));
    }

    #[test]
    fn degenerate_sigma_is_rejected() {
        for &sigma in &[0f32, -0., -1., f32::NAN, f32::INFINITY] {
            assert!(
                matches!(calc_gauss_weights(sigma), Err(AoError::Config(_))),
                "sigma {} was accepted",
                sigma
            );
        }
        // A tiny sigma still yields a normalized kernel
        assert_eq!(calc_gauss_weights(0.01).expect("Radius in range"), vec![0., 1., 0.]);
    }

    #[test]
    fn weights_pack_into_float4s() {
        let weights = calc_gauss_weights(2.5).expect("Radius in range");
        let packed = pack_blur_weights(&weights);
        assert_eq!(packed[0][0], weights[0]);
        assert_eq!(packed[1][1], weights[5]);
        assert_eq!(packed[2][2], weights[10]);
        assert_eq!(packed[2][3], 0.);
    }

    #[test]
    fn constant_buffer_layout() {
        assert_eq!(memoffset::offset_of!(SsaoConstants, inv_proj), 64);
        assert_eq!(memoffset::offset_of!(SsaoConstants, proj_tex), 128);
        assert_eq!(memoffset::offset_of!(SsaoConstants, offset_vectors), 192);
        assert_eq!(memoffset::offset_of!(SsaoConstants, blur_weights), 416);
        assert_eq!(memoffset::offset_of!(SsaoConstants, inv_render_target_size), 464);
        assert_eq!(memoffset::offset_of!(SsaoConstants, occlusion_radius), 472);
        assert_eq!(memoffset::offset_of!(SsaoConstants, blur_radius), 488);
    }

    #[test]
    fn constants_carry_texture_projection() {
        let camera = math::Camera::default();
        let proj = camera.projection();
        let constants = SsaoConstants::new(
            &proj,
            64,
            32,
            &AoConfig::default(),
            &[[0.; 4]; OFFSET_VECTOR_COUNT],
        )
        .expect("Cannot build constants");

        // The view-space point straight ahead lands in the texture centre
        let centre = math::from_array(&constants.proj_tex) * Vec4::new(0., 0., 10., 1.);
        assert!((centre.x / centre.w - 0.5).abs() < 1e-5);
        assert!((centre.y / centre.w - 0.5).abs() < 1e-5);
        assert_eq!(constants.inv_render_target_size, [1. / 64., 1. / 32.]);
        assert_eq!(constants.blur_radius, 5);
    }
}
