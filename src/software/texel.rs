use half::f16;

use crate::enum_wrappers::DxgiFormat;

fn read_f32(bytes: &[u8], index: usize) -> f32 {
    let start = index * 4;
    f32::from_le_bytes([
        bytes[start],
        bytes[start + 1],
        bytes[start + 2],
        bytes[start + 3],
    ])
}

fn read_u16(bytes: &[u8], index: usize) -> u16 {
    let start = index * 2;
    u16::from_le_bytes([bytes[start], bytes[start + 1]])
}

fn unorm_to_float(value: f32, max: f32) -> f32 {
    value / max
}

fn float_to_unorm(value: f32, max: f32) -> f32 {
    // NaN clamps to zero, like hardware conversions do
    let clamped = if value.is_nan() { 0. } else { value.clamp(0., 1.) };
    (clamped * max).round()
}

/// Decodes one texel into RGBA; missing channels read as (0, 0, 0, 1)
pub(crate) fn decode_texel(format: DxgiFormat, bytes: &[u8]) -> [f32; 4] {
    match format {
        DxgiFormat::R32G32B32A32_Float => [
            read_f32(bytes, 0),
            read_f32(bytes, 1),
            read_f32(bytes, 2),
            read_f32(bytes, 3),
        ],
        DxgiFormat::R16G16B16A16_Float => [
            f16::from_bits(read_u16(bytes, 0)).to_f32(),
            f16::from_bits(read_u16(bytes, 1)).to_f32(),
            f16::from_bits(read_u16(bytes, 2)).to_f32(),
            f16::from_bits(read_u16(bytes, 3)).to_f32(),
        ],
        DxgiFormat::R8G8B8A8_UNorm => [
            unorm_to_float(f32::from(bytes[0]), 255.),
            unorm_to_float(f32::from(bytes[1]), 255.),
            unorm_to_float(f32::from(bytes[2]), 255.),
            unorm_to_float(f32::from(bytes[3]), 255.),
        ],
        DxgiFormat::R32_Float | DxgiFormat::D32_Float => {
            [read_f32(bytes, 0), 0., 0., 1.]
        }
        DxgiFormat::R16_UNorm => [
            unorm_to_float(f32::from(read_u16(bytes, 0)), 65535.),
            0.,
            0.,
            1.,
        ],
        DxgiFormat::Unknown
        | DxgiFormat::R32_Typeless
        | DxgiFormat::R16_Typeless => [0., 0., 0., 0.],
    }
}

/// Encodes RGBA into `out`, which must be exactly one texel long
pub(crate) fn encode_texel(format: DxgiFormat, value: [f32; 4], out: &mut [u8]) {
    match format {
        DxgiFormat::R32G32B32A32_Float => {
            for (channel, chunk) in value.iter().zip(out.chunks_mut(4)) {
                chunk.copy_from_slice(&channel.to_le_bytes());
            }
        }
        DxgiFormat::R16G16B16A16_Float => {
            for (channel, chunk) in value.iter().zip(out.chunks_mut(2)) {
                chunk.copy_from_slice(&f16::from_f32(*channel).to_bits().to_le_bytes());
            }
        }
        DxgiFormat::R8G8B8A8_UNorm => {
            for (channel, byte) in value.iter().zip(out.iter_mut()) {
                *byte = float_to_unorm(*channel, 255.) as u8;
            }
        }
        DxgiFormat::R32_Float | DxgiFormat::D32_Float => {
            out.copy_from_slice(&value[0].to_le_bytes());
        }
        DxgiFormat::R16_UNorm => {
            let encoded = float_to_unorm(value[0], 65535.) as u16;
            out.copy_from_slice(&encoded.to_le_bytes());
        }
        DxgiFormat::Unknown
        | DxgiFormat::R32_Typeless
        | DxgiFormat::R16_Typeless => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unorm_clamps_and_keeps_full_intensity_exact() {
        let mut out = [0u8; 2];
        encode_texel(DxgiFormat::R16_UNorm, [1.0, 0., 0., 0.], &mut out);
        assert_eq!(decode_texel(DxgiFormat::R16_UNorm, &out)[0], 1.0);

        encode_texel(DxgiFormat::R16_UNorm, [7.5, 0., 0., 0.], &mut out);
        assert_eq!(u16::from_le_bytes(out), u16::MAX);

        encode_texel(DxgiFormat::R16_UNorm, [f32::NAN, 0., 0., 0.], &mut out);
        assert_eq!(u16::from_le_bytes(out), 0);
    }

    #[test]
    fn half_float_normals_are_exact_for_unit_axes() {
        let mut out = [0u8; 8];
        encode_texel(
            DxgiFormat::R16G16B16A16_Float,
            [0., 0., 1., 0.],
            &mut out,
        );
        assert_eq!(
            decode_texel(DxgiFormat::R16G16B16A16_Float, &out),
            [0., 0., 1., 0.]
        );
    }
}
