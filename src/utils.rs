use bytemuck::Pod;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! impl_from {
    ($struct_type:ty, $integer_type:ty) => {
        impl From<$integer_type> for $struct_type {
            fn from(value: $integer_type) -> Self {
                Self(value as u64)
            }
        }
    };
}

macro_rules! impl_mul_div {
    ($struct_type:tt, $integer_type:ty) => {
        impl std::ops::Mul<$integer_type> for $struct_type {
            type Output = Self;

            fn mul(self, rhs: $integer_type) -> Self {
                Self(self.0 * rhs as u64)
            }
        }

        impl std::ops::Mul<$struct_type> for $integer_type {
            type Output = $struct_type;

            fn mul(self, rhs: $struct_type) -> Self::Output {
                $struct_type(self as u64 * rhs.0)
            }
        }

        impl std::ops::Div<$integer_type> for $struct_type {
            type Output = Self;

            fn div(self, rhs: $integer_type) -> Self {
                Self(self.0 / rhs as u64)
            }
        }
    };
}

/// Bytes

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bytes(pub u64);

// Bytes + Bytes = Bytes
impl std::ops::Add<Bytes> for Bytes {
    type Output = Self;

    fn add(self, rhs: Bytes) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign<Bytes> for Bytes {
    fn add_assign(&mut self, rhs: Self) {
        *self = Self(self.0 + rhs.0);
    }
}

impl std::fmt::Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

impl_mul_div!(Bytes, u32);
impl_mul_div!(Bytes, u64);
impl_mul_div!(Bytes, usize);

impl From<Bytes> for usize {
    fn from(value: Bytes) -> usize {
        value.0 as usize
    }
}

impl_from!(Bytes, u8);
impl_from!(Bytes, u16);
impl_from!(Bytes, u32);
impl_from!(Bytes, u64);
impl_from!(Bytes, usize);

/// Elements

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Elements(pub u64);

impl_from!(Elements, u16);
impl_from!(Elements, u32);
impl_from!(Elements, u64);
impl_from!(Elements, usize);

/// Rounds `location` up to `alignment`, which must be a power of two
pub fn align_to_multiple(location: u64, alignment: u64) -> u64 {
    (location + (alignment - 1)) & (!(alignment - 1))
}

/// Plain-old-data that can be copied into constant and upload buffers
/// byte for byte
pub trait ConstantData: Pod + Default {}

impl<T: Pod + Default> ConstantData for T {}

pub fn as_byte_slice<T: ConstantData>(value: &T) -> &[u8] {
    bytemuck::bytes_of(value)
}

/// Reads a `T` from the beginning of `bytes`, or `None` if the slice is
/// too short.
pub fn from_byte_slice<T: ConstantData>(bytes: &[u8]) -> Option<T> {
    bytes
        .get(..std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up_to_power_of_two() {
        assert_eq!(align_to_multiple(0, 256), 0);
        assert_eq!(align_to_multiple(1, 256), 256);
        assert_eq!(align_to_multiple(256, 256), 256);
        assert_eq!(align_to_multiple(65537, 65536), 131072);
    }

    #[test]
    fn constant_bytes_survive_a_trip_through_a_buffer() {
        let value = [1.0f32, -2.0, 0.5, 8.0];
        let bytes = as_byte_slice(&value).to_vec();
        assert_eq!(bytes.len(), 16);
        assert_eq!(from_byte_slice::<[f32; 4]>(&bytes), Some(value));
        assert_eq!(from_byte_slice::<[f32; 4]>(&bytes[..8]), None);
    }
}
