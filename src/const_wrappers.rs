#![allow(non_upper_case_globals)]

use crate::utils::*;

pub type HRESULT = i32;

pub const S_OK: HRESULT = 0;
pub const E_FAIL: HRESULT = 0x8000_4005_u32 as i32;
pub const E_INVALIDARG: HRESULT = 0x8007_0057_u32 as i32;
pub const E_OUTOFMEMORY: HRESULT = 0x8007_000E_u32 as i32;
pub const DXGI_ERROR_NOT_FOUND: HRESULT = 0x887A_0002_u32 as i32;
pub const DXGI_ERROR_DEVICE_REMOVED: HRESULT = 0x887A_0005_u32 as i32;
pub const DXGI_ERROR_WAS_STILL_DRAWING: HRESULT = 0x887A_000A_u32 as i32;

pub const CONSTANT_BUFFER_ALIGNMENT: Bytes = Bytes(256);

pub const DEFAULT_RESOURCE_ALIGNMENT: Bytes = Bytes(65536);

pub const TEXTURE_DATA_PITCH_ALIGNMENT: Bytes = Bytes(256);

pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: Bytes = Bytes(512);

pub const SIMULTANEOUS_RENDER_TARGET_COUNT: usize = 8;

pub const DESCRIPTOR_HANDLE_INCREMENT_SIZE: u32 = 32;

pub const RESOURCE_BARRIER_ALL_SUBRESOURCES: u32 = 0xffff_ffff;

/// Largest constant buffer view a root descriptor may address
pub const MAX_CONSTANT_BUFFER_VIEW_SIZE: Bytes = Bytes(65536);
