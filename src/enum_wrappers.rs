#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]

use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::utils::Bytes;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DxgiFormat {
    Unknown,
    R32G32B32A32_Float,
    R16G16B16A16_Float,
    R8G8B8A8_UNorm,
    R32_Typeless,
    D32_Float,
    R32_Float,
    R16_Typeless,
    R16_UNorm,
}

impl Default for DxgiFormat {
    fn default() -> Self {
        DxgiFormat::Unknown
    }
}

impl DxgiFormat {
    pub fn get_size(self) -> Bytes {
        match self {
            DxgiFormat::Unknown => Bytes(0),
            DxgiFormat::R32G32B32A32_Float => Bytes(16),
            DxgiFormat::R16G16B16A16_Float => Bytes(8),
            DxgiFormat::R8G8B8A8_UNorm
            | DxgiFormat::R32_Typeless
            | DxgiFormat::D32_Float
            | DxgiFormat::R32_Float => Bytes(4),
            DxgiFormat::R16_Typeless | DxgiFormat::R16_UNorm => Bytes(2),
        }
    }

    pub fn is_typeless(self) -> bool {
        matches!(self, DxgiFormat::R32_Typeless | DxgiFormat::R16_Typeless)
    }

    pub fn is_depth(self) -> bool {
        self == DxgiFormat::D32_Float
    }

    /// The typeless format a fully-typed view format belongs to; formats
    /// in one family can view the same memory.
    pub fn family(self) -> DxgiFormat {
        match self {
            DxgiFormat::R32_Typeless
            | DxgiFormat::D32_Float
            | DxgiFormat::R32_Float => DxgiFormat::R32_Typeless,
            DxgiFormat::R16_Typeless | DxgiFormat::R16_UNorm => {
                DxgiFormat::R16_Typeless
            }
            other => other,
        }
    }

    /// Fully-typed format used when a typeless resource is read back
    pub fn typed_view_format(self) -> DxgiFormat {
        match self {
            DxgiFormat::R32_Typeless => DxgiFormat::R32_Float,
            DxgiFormat::R16_Typeless => DxgiFormat::R16_UNorm,
            other => other,
        }
    }

    pub fn is_view_compatible(self, view_format: DxgiFormat) -> bool {
        view_format == DxgiFormat::Unknown
            || self == view_format
            || self.family() == view_format.family()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    Unknown,
    Buffer,
    Texture2D,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureLayout {
    Unknown,
    RowMajor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HeapType {
    Default,
    Upload,
    Readback,
}

impl HeapType {
    pub fn is_cpu_visible(self) -> bool {
        self != HeapType::Default
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandListType {
    Direct,
    Compute,
    Copy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    CBV_SRV_UAV,
    RTV,
    DSV,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    MinMagMipPoint,
    MinMagMipLinear,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureAddressMode {
    Wrap,
    Clamp,
    Border,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    Always,
}

impl ComparisonFunc {
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            ComparisonFunc::Never => false,
            ComparisonFunc::Less => incoming < stored,
            ComparisonFunc::Equal => incoming == stored,
            ComparisonFunc::LessEqual => incoming <= stored,
            ComparisonFunc::Greater => incoming > stored,
            ComparisonFunc::Always => true,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StaticBorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

impl StaticBorderColor {
    pub fn value(self) -> [f32; 4] {
        match self {
            StaticBorderColor::TransparentBlack => [0., 0., 0., 0.],
            StaticBorderColor::OpaqueBlack => [0., 0., 0., 1.],
            StaticBorderColor::OpaqueWhite => [1., 1., 1., 1.],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderVisibility {
    All,
    Pixel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorRangeType {
    Srv,
    Uav,
    Cbv,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageSeverity {
    Corruption,
    Error,
    Warning,
    Info,
    Message,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    StateCreation,
    StateSetting,
    Execution,
    ResourceManipulation,
}

bitflags! {
    pub struct ResourceFlags: u32 {
        const None = 0;
        const AllowRenderTarget = 0x1;
        const AllowDepthStencil = 0x2;
        const AllowUnorderedAccess = 0x4;
        const DenyShaderResource = 0x8;
        const AllowCrossAdapter = 0x10;
        const AllowSimultaneousAccess = 0x20;
    }
}

bitflags! {
    pub struct HeapFlags: u32 {
        const None = 0;
        const Shared = 0x1;
        const DenyBuffers = 0x4;
        const AllowDisplay = 0x8;
        const SharedCrossAdapter = 0x20;
        const DenyRtDsTextures = 0x40;
        const DenyNonRtDsTextures = 0x80;
    }
}

bitflags! {
    pub struct ResourceStates: u32 {
        const Common = 0;
        const VertexAndConstantBuffer = 0x1;
        const IndexBuffer = 0x2;
        const RenderTarget = 0x4;
        const UnorderedAccess = 0x8;
        const DepthWrite = 0x10;
        const DepthRead = 0x20;
        const NonPixelShaderResource = 0x40;
        const PixelShaderResource = 0x80;
        const CopyDest = 0x400;
        const CopySource = 0x800;
        const AllShaderResource = 0x40 | 0x80;
        const GenericRead = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
    }
}

impl ResourceStates {
    /// Write states cannot be combined with anything else
    pub fn is_write_state(self) -> bool {
        self == ResourceStates::RenderTarget
            || self == ResourceStates::UnorderedAccess
            || self == ResourceStates::DepthWrite
            || self == ResourceStates::CopyDest
    }
}

bitflags! {
    pub struct ClearFlags: u32 {
        const Depth = 0x1;
        const Stencil = 0x2;
    }
}

bitflags! {
    pub struct FenceFlags: u32 {
        const None = 0;
        const Shared = 0x1;
        const SharedCrossAdapter = 0x2;
    }
}

bitflags! {
    pub struct DescriptorHeapFlags: u32 {
        const None = 0;
        const ShaderVisible = 0x1;
    }
}

bitflags! {
    pub struct RootSignatureFlags: u32 {
        const None = 0;
        const AllowInputAssemblerInputLayout = 0x1;
    }
}

bitflags! {
    pub struct AdapterFlags: u32 {
        const None = 0;
        const Remote = 0x1;
        const Software = 0x2;
    }
}
