//! Camera and projection helpers. Matrices are cgmath column-major and
//! follow the D3D left-handed conventions: view space looks down +z and NDC
//! depth runs from 0 at the near plane to 1 at the far plane.

use cgmath::prelude::*;
use cgmath::{Matrix4, Vector2, Vector3, Vector4};
use log::warn;

pub type Mat4 = Matrix4<f32>;
pub type Vec2 = Vector2<f32>;
pub type Vec3 = Vector3<f32>;
pub type Vec4 = Vector4<f32>;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Degrees(pub f32);

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub near: f32,
    pub far: f32,
    pub fov: Degrees,
    pub aspect: f32,
    pub position: Vec3,
    pub look_at: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            near: 1.,
            far: 1000.,
            fov: Degrees(45.),
            aspect: 16. / 9.,
            position: Vec3::new(0., 2., -8.),
            look_at: Vec3::new(0., 0., 0.),
        }
    }
}

impl Camera {
    pub fn set_aspect_ratio(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height as f32;
    }

    pub fn projection(&self) -> Mat4 {
        make_projection_matrix(self)
    }

    pub fn view(&self) -> Mat4 {
        make_view_matrix(self.position, self.look_at)
    }
}

pub fn make_projection_matrix(camera: &Camera) -> Mat4 {
    Matrix4::from_cols(
        Vec4 {
            x: 1. / (camera.aspect * cgmath::Deg(camera.fov.0 / 2.).tan()),
            y: 0.,
            z: 0.,
            w: 0.,
        },
        Vec4 {
            x: 0.,
            y: 1. / cgmath::Deg(camera.fov.0 / 2.).tan(),
            z: 0.,
            w: 0.,
        },
        Vec4 {
            x: 0.,
            y: 0.,
            z: camera.far / (camera.far - camera.near),
            w: 1.,
        },
        Vec4 {
            x: 0.,
            y: 0.,
            z: -camera.near * camera.far / (camera.far - camera.near),
            w: 0.,
        },
    )
}

pub fn make_view_matrix(camera_pos: Vec3, look_at: Vec3) -> Mat4 {
    let cam_k = (look_at - camera_pos).normalize();
    let wrld_up = Vec3::new(0., 1., 0.);
    let cam_i = wrld_up.cross(cam_k).normalize();
    let cam_j = cam_k.cross(cam_i);

    let orientation = Matrix4::from_cols(
        cam_i.extend(0.),
        cam_j.extend(0.),
        cam_k.extend(0.),
        Vec4::new(0., 0., 0., 1.),
    );

    let translation = Matrix4::from_translation(camera_pos);

    match (translation * orientation).invert() {
        Some(view) => view,
        None => {
            warn!("Degenerate camera at {:?} looking at {:?}", camera_pos, look_at);
            Matrix4::identity()
        }
    }
}

/// Maps NDC [-1, 1]^2 to texture space [0, 1]^2 with v pointing down
pub fn texture_transform() -> Mat4 {
    Matrix4::new(
        0.5, 0., 0., 0.,
        0., -0.5, 0., 0.,
        0., 0., 1., 0.,
        0.5, 0.5, 0., 1.,
    )
}

/// Inverse of the projection's depth mapping
pub fn ndc_depth_to_view_depth(proj: &Mat4, z_ndc: f32) -> f32 {
    proj[3][2] / (z_ndc - proj[2][2])
}

/// View-space point on the near plane behind a texture coordinate
pub fn near_plane_position(inv_proj: &Mat4, tex_coord: [f32; 2]) -> Vec3 {
    let ndc = Vec4::new(2. * tex_coord[0] - 1., 1. - 2. * tex_coord[1], 0., 1.);
    let position = *inv_proj * ndc;
    position.truncate() / position.w
}

pub fn to_array(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

pub fn from_array(matrix: &[[f32; 4]; 4]) -> Mat4 {
    Matrix4::from(*matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(lhs: f32, rhs: f32) -> bool {
        (lhs - rhs).abs() <= 1e-4 * lhs.abs().max(1.)
    }

    #[test]
    fn projection_maps_near_and_far_planes() {
        let camera = Camera::default();
        let proj = camera.projection();
        let near = proj * Vec4::new(0., 0., camera.near, 1.);
        let far = proj * Vec4::new(0., 0., camera.far, 1.);
        assert!(approx_eq(near.z / near.w, 0.));
        assert!(approx_eq(far.z / far.w, 1.));
    }

    #[test]
    fn view_depth_round_trips_through_ndc() {
        let camera = Camera::default();
        let proj = camera.projection();
        let clip = proj * Vec4::new(0.3, -0.2, 12.5, 1.);
        let view_z = ndc_depth_to_view_depth(&proj, clip.z / clip.w);
        assert!(approx_eq(view_z, 12.5), "{}", view_z);
    }

    #[test]
    fn texture_transform_maps_ndc_corners() {
        let t = texture_transform();
        let top_left = t * Vec4::new(-1., 1., 0., 1.);
        let bottom_right = t * Vec4::new(1., -1., 0., 1.);
        assert_eq!((top_left.x, top_left.y), (0., 0.));
        assert_eq!((bottom_right.x, bottom_right.y), (1., 1.));
    }

    #[test]
    fn near_plane_position_lies_on_near_plane() {
        let camera = Camera::default();
        let inv_proj = camera.projection().invert().expect("No matrix inverse");
        let position = near_plane_position(&inv_proj, [0.5, 0.5]);
        assert!(approx_eq(position.z, camera.near));
        assert!(approx_eq(position.x, 0.) && approx_eq(position.y, 0.));
    }

    #[test]
    fn view_matrix_moves_camera_to_origin() {
        let camera = Camera::default();
        let eye = camera.view() * camera.position.extend(1.);
        assert!(approx_eq(eye.x, 0.) && approx_eq(eye.y, 0.) && approx_eq(eye.z, 0.));
        let target = camera.view() * camera.look_at.extend(1.);
        assert!(target.z > 0.);
    }
}
