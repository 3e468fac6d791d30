//! The geometry pass that feeds ambient occlusion and the final composite.
//!
//! The scene is ray cast per pixel: a ground plane with a few spheres on it.
//! The pass writes view-space normals into the normal map and the hit depth
//! through SV_Depth, the same inputs a rasterized G-buffer pass would leave.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use cgmath::prelude::*;
use log::trace;

use crate::ao_resources::{
    full_screen_viewport, AoMaps, AoViews, AMBIENT_SRV, DEPTH_CLEAR, DEPTH_DSV_FORMAT,
    NORMAL_MAP_CLEAR, NORMAL_MAP_FORMAT, NORMAL_SRV,
};
use crate::error::{AoError, AoResult};
use crate::math::{self, Camera, Vec3};
use crate::shader::{PixelInput, PixelOutput, PixelShader, ShaderContext};
use crate::*;

pub const BACK_BUFFER_FORMAT: DxgiFormat = DxgiFormat::R8G8B8A8_UNorm;
pub const BACK_BUFFER_CLEAR: [f32; 4] = [0.1, 0.1, 0.15, 1.];

const PLANE_EXTENT: f32 = 20.;
/// (center, radius) in world space
const SPHERES: [([f32; 3], f32); 4] = [
    ([0., 1., 0.], 1.),
    ([-2.5, 0.75, 1.5], 0.75),
    ([2.2, 0.5, -0.5], 0.5),
    ([1., 1.5, 3.], 1.5),
];

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub eye_position: [f32; 4],
    pub render_target_size: [f32; 2],
    pub near_z: f32,
    pub far_z: f32,
    pub padding: [f32; 8],
}

const_assert_eq!(std::mem::size_of::<PassConstants>(), 256);

impl PassConstants {
    pub fn new(camera: &Camera, width: u32, height: u32) -> AoResult<Self> {
        let proj = camera.projection();
        let inv_proj = proj
            .invert()
            .ok_or_else(|| AoError::Config(String::from("projection matrix is singular")))?;
        Ok(Self {
            view: math::to_array(&camera.view()),
            proj: math::to_array(&proj),
            inv_proj: math::to_array(&inv_proj),
            eye_position: camera.position.extend(1.).into(),
            render_target_size: [width as f32, height as f32],
            near_z: camera.near,
            far_z: camera.far,
            padding: [0.; 8],
        })
    }
}

fn ndc_depth(proj: &math::Mat4, position: Vec3) -> f32 {
    let clip = *proj * position.extend(1.);
    clip.z / clip.w
}

fn intersect_sphere(direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let b = direction.dot(center);
    let discriminant = b * b - center.magnitude2() + radius * radius;
    if discriminant < 0. {
        return None;
    }
    let t = b - discriminant.sqrt();
    if t > 0. {
        Some(t)
    } else {
        None
    }
}

/// Ray casts the plane and spheres, writing view-space normals and depth
pub struct SceneShader;

impl PixelShader for SceneShader {
    fn name(&self) -> &str {
        "Scene"
    }

    fn shade(&self, context: &ShaderContext<'_>, input: &PixelInput) -> PixelOutput {
        let constants: PassConstants = context.constants(0);
        let view = math::from_array(&constants.view);
        let proj = math::from_array(&constants.proj);
        let inv_proj = math::from_array(&constants.inv_proj);

        // The eye sits at the view-space origin
        let direction = math::near_plane_position(&inv_proj, input.tex_coord).normalize();

        let mut nearest: Option<(f32, Vec3)> = None;
        let mut consider = |t: f32, normal: Vec3| {
            if nearest.map_or(true, |(best, _)| t < best) {
                nearest = Some((t, normal));
            }
        };

        let plane_normal = (view * Vec3::unit_y().extend(0.)).truncate();
        let plane_point = (view * Vec3::zero().extend(1.)).truncate();
        let denominator = direction.dot(plane_normal);
        if denominator.abs() > 1e-6 {
            let t = plane_point.dot(plane_normal) / denominator;
            if t > 0. {
                let world = (view.invert().unwrap_or_else(math::Mat4::identity)
                    * (direction * t).extend(1.))
                .truncate();
                if world.x.abs() <= PLANE_EXTENT && world.z.abs() <= PLANE_EXTENT {
                    consider(t, plane_normal);
                }
            }
        }

        for (center, radius) in SPHERES.iter() {
            let center = (view * Vec3::from(*center).extend(1.)).truncate();
            if let Some(t) = intersect_sphere(direction, center, *radius) {
                consider(t, (direction * t - center).normalize());
            }
        }

        match nearest {
            Some((t, normal)) => PixelOutput {
                color: [normal.x, normal.y, normal.z, 0.],
                depth: Some(ndc_depth(&proj, direction * t)),
            },
            // Nothing hit: leave the cleared values behind the far plane test
            None => PixelOutput {
                color: NORMAL_MAP_CLEAR,
                depth: Some(DEPTH_CLEAR),
            },
        }
    }
}

/// A surface facing the camera at a fixed NDC depth taken from root constant
/// b1, for scenes whose ambient term is known in advance
pub struct FlatSurfaceShader;

impl PixelShader for FlatSurfaceShader {
    fn name(&self) -> &str {
        "Flat surface"
    }

    fn shade(&self, context: &ShaderContext<'_>, _input: &PixelInput) -> PixelOutput {
        PixelOutput {
            color: [0., 0., 1., 0.],
            depth: Some(f32::from_bits(context.root_constant(1, 0))),
        }
    }
}

/// Modulates a simple diffuse term by the ambient map
pub struct CompositeShader;

impl PixelShader for CompositeShader {
    fn name(&self) -> &str {
        "Composite"
    }

    fn shade(&self, context: &ShaderContext<'_>, input: &PixelInput) -> PixelOutput {
        let ambient = context.sample_level(0, 0, input.tex_coord)[0];
        let normal = context.sample_level(1, 0, input.tex_coord);
        let normal = Vec3::new(normal[0], normal[1], normal[2]);
        let to_light = Vec3::new(-0.4, 0.8, -0.45).normalize();
        let diffuse = if normal.magnitude2() > 0. {
            normal.normalize().dot(to_light).max(0.)
        } else {
            0.
        };
        let shade = 0.8 * (0.4 * ambient + 0.6 * diffuse * ambient);
        PixelOutput {
            color: [shade, shade, shade, 1.],
            depth: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SceneKind {
    Procedural,
    /// Every pixel at the same NDC depth with normal (0, 0, 1)
    Flat { depth: f32 },
}

impl Default for SceneKind {
    fn default() -> Self {
        SceneKind::Procedural
    }
}

/// Root signature and pipeline of the normal/depth pass
pub struct ScenePass {
    kind: SceneKind,
    root_signature: RootSignature,
    pso: PipelineState,
}

impl ScenePass {
    pub fn new(device: &Device, input_layout: &InputLayoutDesc, kind: SceneKind) -> DxResult<Self> {
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
        ];
        let root_signature = device.create_root_signature(
            0,
            &RootSignatureDesc::default()
                .set_parameters(&parameters)
                .set_flags(RootSignatureFlags::AllowInputAssemblerInputLayout),
        )?;
        root_signature.set_name("Scene root signature")?;

        let shader: Arc<dyn PixelShader> = match kind {
            SceneKind::Procedural => Arc::new(SceneShader),
            SceneKind::Flat { .. } => Arc::new(FlatSurfaceShader),
        };
        let pso = device.create_graphics_pipeline_state(
            &GraphicsPipelineStateDesc::default()
                .set_root_signature(&root_signature)
                .set_pixel_shader(shader)
                .set_input_layout(input_layout)
                .set_depth_stencil_state(&DepthStencilDesc::default())
                .set_rtv_formats(&[NORMAL_MAP_FORMAT])
                .set_dsv_format(DEPTH_DSV_FORMAT),
        )?;
        pso.set_name("Scene pipeline")?;

        trace!("Created {:?} scene pass", kind);
        Ok(Self {
            kind,
            root_signature,
            pso,
        })
    }

    pub fn kind(&self) -> SceneKind {
        self.kind
    }

    /// Renders normals and depth into `maps`, leaving both in the render
    /// target and depth write states
    pub fn record(
        &self,
        list: &mut CommandList,
        pass_constants: GpuVirtualAddress,
        maps: &AoMaps,
        views: &AoViews,
        (width, height): (u32, u32),
    ) {
        list.transition_barrier(&maps.normal, ResourceStates::RenderTarget);
        list.transition_barrier(&maps.depth, ResourceStates::DepthWrite);
        list.flush_resource_barriers();
        list.clear_render_target_view(views.normal_rtv, NORMAL_MAP_CLEAR);
        list.clear_depth_stencil_view(views.depth_dsv, ClearFlags::Depth, DEPTH_CLEAR, 0);

        let (viewport, scissor) = full_screen_viewport(width, height);
        list.set_viewports(&[viewport]);
        list.set_scissor_rects(&[scissor]);
        list.set_render_targets(&[views.normal_rtv], Some(views.depth_dsv));

        list.set_graphics_root_signature(&self.root_signature);
        list.set_pipeline_state(&self.pso);
        list.set_graphics_root_constant_buffer_view(0, pass_constants);
        let flat_depth = match self.kind {
            SceneKind::Flat { depth } => depth,
            SceneKind::Procedural => DEPTH_CLEAR,
        };
        list.set_graphics_root_32bit_constant(1, flat_depth.to_bits(), 0);
        list.draw_instanced(6, 1, 0, 0);
    }
}

/// Lights the scene with the prime device's ambient map into a back buffer
pub struct CompositePass {
    root_signature: RootSignature,
    pso: PipelineState,
}

impl CompositePass {
    pub fn new(device: &Device, input_layout: &InputLayoutDesc) -> DxResult<Self> {
        // The ambient and normal maps live in the prime SSAO heap, the table
        // starts at the normal map slot
        let table = RootDescriptorTable::default().set_descriptor_ranges(&[
            DescriptorRange::default()
                .set_range_type(DescriptorRangeType::Srv)
                .set_num_descriptors(Elements(1))
                .set_base_shader_register(Elements(0))
                .set_offset_in_descriptors_from_table_start((AMBIENT_SRV - NORMAL_SRV).into()),
            DescriptorRange::default()
                .set_range_type(DescriptorRangeType::Srv)
                .set_num_descriptors(Elements(1))
                .set_base_shader_register(Elements(1))
                .set_offset_in_descriptors_from_table_start(0.into()),
        ]);
        let root_signature = device.create_root_signature(
            0,
            &RootSignatureDesc::default()
                .set_parameters(&[RootParameter::default()
                    .set_parameter_type(RootParameterType::DescriptorTable)
                    .set_descriptor_table(&table)
                    .set_shader_visibility(ShaderVisibility::Pixel)])
                .set_static_samplers(&[StaticSamplerDesc::default()
                    .set_filter(Filter::MinMagMipPoint)
                    .set_address_u(TextureAddressMode::Clamp)
                    .set_address_v(TextureAddressMode::Clamp)
                    .set_address_w(TextureAddressMode::Clamp)
                    .set_shader_register(Elements(0))])
                .set_flags(RootSignatureFlags::AllowInputAssemblerInputLayout),
        )?;
        root_signature.set_name("Composite root signature")?;

        let pso = device.create_graphics_pipeline_state(
            &GraphicsPipelineStateDesc::default()
                .set_root_signature(&root_signature)
                .set_pixel_shader(Arc::new(CompositeShader))
                .set_input_layout(input_layout)
                .set_depth_stencil_state(
                    &DepthStencilDesc::default()
                        .set_depth_enable(false)
                        .set_depth_write(false),
                )
                .set_rtv_formats(&[BACK_BUFFER_FORMAT])
                .set_dsv_format(DxgiFormat::Unknown),
        )?;
        pso.set_name("Composite pipeline")?;

        Ok(Self {
            root_signature,
            pso,
        })
    }

    pub fn record(
        &self,
        list: &mut CommandList,
        maps: &AoMaps,
        views: &AoViews,
        back_buffer: &Resource,
        back_buffer_rtv: CpuDescriptorHandle,
        (width, height): (u32, u32),
    ) {
        list.transition_barrier(&maps.normal, ResourceStates::PixelShaderResource);
        list.transition_barrier(&maps.ambient[0], ResourceStates::PixelShaderResource);
        list.transition_barrier(back_buffer, ResourceStates::RenderTarget);
        list.flush_resource_barriers();
        list.clear_render_target_view(back_buffer_rtv, BACK_BUFFER_CLEAR);

        let (viewport, scissor) = full_screen_viewport(width, height);
        list.set_viewports(&[viewport]);
        list.set_scissor_rects(&[scissor]);
        list.set_render_targets(&[back_buffer_rtv], None);

        list.set_graphics_root_signature(&self.root_signature);
        list.set_pipeline_state(&self.pso);
        list.set_descriptor_heaps(&[views.srv_heap.clone()]);
        list.set_graphics_root_descriptor_table(0, views.normal_srv);
        list.draw_instanced(6, 1, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_constants_layout() {
        assert_eq!(memoffset::offset_of!(PassConstants, inv_proj), 128);
        assert_eq!(memoffset::offset_of!(PassConstants, eye_position), 192);
        assert_eq!(memoffset::offset_of!(PassConstants, render_target_size), 208);
        assert_eq!(memoffset::offset_of!(PassConstants, near_z), 216);
    }

    #[test]
    fn rays_hit_the_front_of_spheres() {
        let t = intersect_sphere(Vec3::unit_z(), Vec3::new(0., 0., 10.), 2.)
            .expect("Ray misses the sphere");
        assert!((t - 8.).abs() < 1e-5);
        assert!(intersect_sphere(Vec3::unit_z(), Vec3::new(5., 0., 10.), 2.).is_none());
        assert!(intersect_sphere(Vec3::unit_z(), Vec3::new(0., 0., -10.), 2.).is_none());
    }

    #[test]
    fn scene_depth_lies_inside_clip_range() {
        let camera = Camera::default();
        let proj = camera.projection();
        let center = (camera.view() * Vec3::new(0., 1., 0.).extend(1.)).truncate();
        let depth = ndc_depth(&proj, center);
        assert!(depth > 0. && depth < 1.);
    }
}
