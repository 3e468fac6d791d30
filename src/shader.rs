//! Shader programs for the software adapter.
//!
//! Pixel shaders run once per covered pixel of a full-screen pass, compute
//! shaders once per dispatched thread. Both read their inputs through the
//! root signature bindings resolved when the draw or dispatch executes.

use crate::enum_wrappers::*;
use crate::software::texel::decode_texel;
use crate::struct_wrappers::StaticSamplerDesc;
use crate::utils::{from_byte_slice, ConstantData};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PixelInput {
    /// SV_Position.xy, pixel centre in render target space
    pub position: [f32; 2],
    /// [0, 1] across the viewport
    pub tex_coord: [f32; 2],
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PixelOutput {
    pub color: [f32; 4],
    /// SV_Depth; `None` keeps the interpolated depth of the full-screen
    /// triangle, which is 0
    pub depth: Option<f32>,
}

pub trait PixelShader: Send + Sync {
    fn name(&self) -> &str;

    fn shade(&self, context: &ShaderContext<'_>, input: &PixelInput) -> PixelOutput;
}

pub trait ComputeShader: Send + Sync {
    fn name(&self) -> &str;

    fn thread_group_size(&self) -> [u32; 3];

    fn execute(&self, context: &mut ComputeContext<'_>, dispatch_thread_id: [u32; 3]);
}

/// Shader-readable copy of a texture, decoded to RGBA floats
#[derive(Clone, Debug, PartialEq)]
pub struct TextureView {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

fn wrap_coordinate(coordinate: i64, size: u32, mode: TextureAddressMode) -> Option<u32> {
    let size = i64::from(size);
    match mode {
        TextureAddressMode::Wrap => Some(coordinate.rem_euclid(size) as u32),
        TextureAddressMode::Clamp => Some(coordinate.clamp(0, size - 1) as u32),
        TextureAddressMode::Border => {
            if coordinate < 0 || coordinate >= size {
                None
            } else {
                Some(coordinate as u32)
            }
        }
    }
}

fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

impl TextureView {
    pub fn new(width: u32, height: u32, texels: Vec<[f32; 4]>) -> Self {
        debug_assert_eq!(texels.len(), (width * height) as usize);
        Self {
            width,
            height,
            texels,
        }
    }

    /// Decodes tightly packed rows of `format` texels
    pub fn from_bytes(width: u32, height: u32, format: DxgiFormat, bytes: &[u8]) -> Self {
        let texel_size = format.typed_view_format().get_size().0.max(1) as usize;
        let texels = bytes
            .chunks(texel_size)
            .take((width * height) as usize)
            .map(|texel| decode_texel(format.typed_view_format(), texel))
            .collect();
        Self::new(width, height, texels)
    }

    pub fn filled(width: u32, height: u32, value: [f32; 4]) -> Self {
        Self::new(width, height, vec![value; (width * height) as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub(crate) fn into_texels(self) -> Vec<[f32; 4]> {
        self.texels
    }

    /// Texture.Load; out-of-range reads return zero
    pub fn load(&self, x: i32, y: i32) -> [f32; 4] {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return [0.; 4];
        }
        self.texels[(y as u32 * self.width + x as u32) as usize]
    }

    pub fn store(&mut self, x: u32, y: u32, value: [f32; 4]) {
        if x < self.width && y < self.height {
            self.texels[(y * self.width + x) as usize] = value;
        }
    }

    fn fetch(&self, x: i64, y: i64, sampler: &StaticSamplerDesc) -> [f32; 4] {
        match (
            wrap_coordinate(x, self.width, sampler.address_u()),
            wrap_coordinate(y, self.height, sampler.address_v()),
        ) {
            (Some(x), Some(y)) => self.texels[(y * self.width + x) as usize],
            _ => sampler.border_color().value(),
        }
    }

    /// Texture.SampleLevel at mip 0
    pub fn sample_level(&self, sampler: &StaticSamplerDesc, uv: [f32; 2]) -> [f32; 4] {
        let x = uv[0] * self.width as f32;
        let y = uv[1] * self.height as f32;
        match sampler.filter() {
            Filter::MinMagMipPoint => {
                self.fetch(x.floor() as i64, y.floor() as i64, sampler)
            }
            Filter::MinMagMipLinear => {
                let x = x - 0.5;
                let y = y - 0.5;
                let x0 = x.floor();
                let y0 = y.floor();
                let tx = x - x0;
                let ty = y - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = lerp4(
                    self.fetch(x0, y0, sampler),
                    self.fetch(x0 + 1, y0, sampler),
                    tx,
                );
                let bottom = lerp4(
                    self.fetch(x0, y0 + 1, sampler),
                    self.fetch(x0 + 1, y0 + 1, sampler),
                    tx,
                );
                lerp4(top, bottom, ty)
            }
        }
    }
}

/// Everything a root signature made visible to one draw or dispatch
#[derive(Clone, Debug, Default)]
pub struct ShaderBindings {
    pub(crate) constant_buffers: Vec<(u32, Vec<u8>)>,
    pub(crate) root_constants: Vec<(u32, Vec<u32>)>,
    pub(crate) textures: Vec<(u32, TextureView)>,
    pub(crate) samplers: Vec<StaticSamplerDesc>,
}

#[derive(Copy, Clone)]
pub struct ShaderContext<'a> {
    bindings: &'a ShaderBindings,
}

impl<'a> ShaderContext<'a> {
    pub(crate) fn new(bindings: &'a ShaderBindings) -> Self {
        Self { bindings }
    }

    /// Contents of constant buffer `b<register>`; unbound buffers read as
    /// zeroes
    pub fn constants<T: ConstantData>(&self, register: u32) -> T {
        self.bindings
            .constant_buffers
            .iter()
            .find(|(bound, _)| *bound == register)
            .and_then(|(_, bytes)| from_byte_slice::<T>(bytes))
            .unwrap_or_default()
    }

    pub fn root_constant(&self, register: u32, index: usize) -> u32 {
        self.bindings
            .root_constants
            .iter()
            .find(|(bound, _)| *bound == register)
            .and_then(|(_, values)| values.get(index).copied())
            .unwrap_or(0)
    }

    pub fn texture(&self, register: u32) -> Option<&'a TextureView> {
        self.bindings
            .textures
            .iter()
            .find(|(bound, _)| *bound == register)
            .map(|(_, view)| view)
    }

    pub fn texture_size(&self, register: u32) -> [u32; 2] {
        self.texture(register)
            .map_or([0, 0], |view| [view.width(), view.height()])
    }

    pub fn load(&self, register: u32, x: i32, y: i32) -> [f32; 4] {
        self.texture(register).map_or([0.; 4], |view| view.load(x, y))
    }

    pub fn sample_level(&self, register: u32, sampler: u32, uv: [f32; 2]) -> [f32; 4] {
        let sampler = self
            .bindings
            .samplers
            .iter()
            .find(|desc| desc.shader_register() == sampler);
        match (self.texture(register), sampler) {
            (Some(view), Some(sampler)) => view.sample_level(sampler, uv),
            _ => [0.; 4],
        }
    }
}

pub struct ComputeContext<'a> {
    shader: ShaderContext<'a>,
    uavs: &'a mut [(u32, TextureView)],
}

impl<'a> ComputeContext<'a> {
    pub(crate) fn new(
        bindings: &'a ShaderBindings,
        uavs: &'a mut [(u32, TextureView)],
    ) -> Self {
        Self {
            shader: ShaderContext::new(bindings),
            uavs,
        }
    }

    pub fn uav_size(&self, register: u32) -> [u32; 2] {
        self.uavs
            .iter()
            .find(|(bound, _)| *bound == register)
            .map_or([0, 0], |(_, view)| [view.width(), view.height()])
    }

    pub fn store(&mut self, register: u32, x: u32, y: u32, value: [f32; 4]) {
        if let Some((_, view)) = self.uavs.iter_mut().find(|(bound, _)| *bound == register) {
            view.store(x, y, value);
        }
    }
}

impl<'a> std::ops::Deref for ComputeContext<'a> {
    type Target = ShaderContext<'a>;

    fn deref(&self) -> &Self::Target {
        &self.shader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Elements;

    fn gradient() -> TextureView {
        TextureView::new(
            2,
            1,
            vec![[0., 0., 0., 1.], [1., 0., 0., 1.]],
        )
    }

    #[test]
    fn linear_filter_interpolates_between_texel_centres() {
        let sampler = StaticSamplerDesc::default()
            .set_filter(Filter::MinMagMipLinear)
            .set_address_u(TextureAddressMode::Clamp)
            .set_address_v(TextureAddressMode::Clamp);
        let view = gradient();
        assert_eq!(view.sample_level(&sampler, [0.5, 0.5])[0], 0.5);
        assert_eq!(view.sample_level(&sampler, [0.25, 0.5])[0], 0.);
        assert_eq!(view.sample_level(&sampler, [1.0, 0.5])[0], 1.);
    }

    #[test]
    fn border_addressing_returns_border_colour() {
        let sampler = StaticSamplerDesc::default()
            .set_filter(Filter::MinMagMipPoint)
            .set_address_u(TextureAddressMode::Border)
            .set_address_v(TextureAddressMode::Border)
            .set_border_color(StaticBorderColor::OpaqueWhite)
            .set_shader_register(Elements(2));
        let view = gradient();
        assert_eq!(view.sample_level(&sampler, [-0.1, 0.5]), [1.; 4]);
        assert_eq!(view.sample_level(&sampler, [0.1, 0.5]), [0., 0., 0., 1.]);
    }

    #[test]
    fn wrap_addressing_repeats() {
        let sampler = StaticSamplerDesc::default().set_filter(Filter::MinMagMipPoint);
        let view = gradient();
        assert_eq!(view.sample_level(&sampler, [1.75, 0.5])[0], 1.);
        assert_eq!(view.sample_level(&sampler, [-0.25, 0.5])[0], 1.);
    }
}
