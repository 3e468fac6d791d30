use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;

use super::lock;
use crate::const_wrappers::*;
use crate::enum_wrappers::*;
use crate::struct_wrappers::ResourceDesc;
use crate::utils::align_to_multiple;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id for heaps, resources and descriptor heaps
pub(crate) fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Dedicated memory of one adapter
#[derive(Debug)]
pub(crate) struct MemoryBudget {
    capacity: u64,
    used: Mutex<u64>,
}

impl MemoryBudget {
    pub(crate) fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: Mutex::new(0),
        }
    }

    pub(crate) fn reserve(&self, size: u64) -> Result<(), HRESULT> {
        let mut used = lock(&self.used);
        if *used + size > self.capacity {
            return Err(E_OUTOFMEMORY);
        }
        *used += size;
        Ok(())
    }

    pub(crate) fn release(&self, size: u64) {
        let mut used = lock(&self.used);
        *used = used.saturating_sub(size);
    }

    pub(crate) fn used(&self) -> u64 {
        *lock(&self.used)
    }
}

/// A block of device memory. Shared heaps opened on another device hold
/// the same `Arc<HeapMemory>` as the heap they were exported from.
#[derive(Debug)]
pub(crate) struct HeapMemory {
    pub(crate) id: u64,
    pub(crate) size: u64,
    bytes: Mutex<Vec<u8>>,
    budget: Arc<MemoryBudget>,
}

impl HeapMemory {
    pub(crate) fn allocate(
        size: u64,
        budget: &Arc<MemoryBudget>,
    ) -> Result<Arc<Self>, HRESULT> {
        if size == 0 {
            return Err(E_INVALIDARG);
        }
        budget.reserve(size)?;
        let memory = Arc::new(Self {
            id: next_object_id(),
            size,
            bytes: Mutex::new(vec![0; size as usize]),
            budget: Arc::clone(budget),
        });
        trace!("Allocated {} bytes of device memory #{}", size, memory.id);
        Ok(memory)
    }

    pub(crate) fn read(&self, offset: u64, len: u64) -> Vec<u8> {
        let bytes = lock(&self.bytes);
        let start = offset as usize;
        bytes[start..start + len as usize].to_vec()
    }

    pub(crate) fn write(&self, offset: u64, data: &[u8]) {
        let mut bytes = lock(&self.bytes);
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
    }
}

impl Drop for HeapMemory {
    fn drop(&mut self) {
        self.budget.release(self.size);
        trace!("Released device memory #{}", self.id);
    }
}

/// How a single-subresource resource is laid out in its memory
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct SubresourceLayout {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) texel_size: u64,
    pub(crate) row_pitch: u64,
    pub(crate) size: u64,
}

impl SubresourceLayout {
    pub(crate) fn for_desc(desc: &ResourceDesc) -> Result<Self, HRESULT> {
        match desc.dimension() {
            ResourceDimension::Buffer => {
                if desc.layout() != TextureLayout::RowMajor
                    || desc.width() == 0
                    || desc.height() != 1
                {
                    return Err(E_INVALIDARG);
                }
                Ok(Self {
                    width: desc.width() as u32,
                    height: 1,
                    texel_size: 1,
                    row_pitch: desc.width(),
                    size: desc.width(),
                })
            }
            ResourceDimension::Texture2D => {
                let texel_size = desc.format().get_size().0;
                if texel_size == 0
                    || desc.width() == 0
                    || desc.height() == 0
                    || desc.width() > u64::from(u32::MAX)
                    || desc.mip_levels() != 1
                    || desc.depth_or_array_size() != 1
                {
                    return Err(E_INVALIDARG);
                }
                let row_bytes = desc.width() * texel_size;
                let row_pitch = match desc.layout() {
                    TextureLayout::RowMajor => align_to_multiple(
                        row_bytes,
                        TEXTURE_DATA_PITCH_ALIGNMENT.0,
                    ),
                    TextureLayout::Unknown => row_bytes,
                };
                Ok(Self {
                    width: desc.width() as u32,
                    height: desc.height(),
                    texel_size,
                    row_pitch,
                    size: row_pitch * u64::from(desc.height()),
                })
            }
            ResourceDimension::Unknown => Err(E_INVALIDARG),
        }
    }

    pub(crate) fn row_bytes(&self) -> u64 {
        u64::from(self.width) * self.texel_size
    }

    pub(crate) fn allocation_size(&self) -> u64 {
        align_to_multiple(self.size, DEFAULT_RESOURCE_ALIGNMENT.0)
    }

    /// Reads the rows into a tightly packed vector
    pub(crate) fn read_packed(&self, memory: &HeapMemory, base: u64) -> Vec<u8> {
        let raw = memory.read(base, self.size);
        if self.row_pitch == self.row_bytes() {
            return raw;
        }
        let row_bytes = self.row_bytes() as usize;
        let mut packed = Vec::with_capacity(row_bytes * self.height as usize);
        for row in raw.chunks(self.row_pitch as usize) {
            packed.extend_from_slice(&row[..row_bytes]);
        }
        packed
    }

    /// Writes tightly packed rows, leaving the pitch padding untouched
    pub(crate) fn write_packed(&self, memory: &HeapMemory, base: u64, packed: &[u8]) {
        let row_bytes = self.row_bytes() as usize;
        if self.row_pitch == self.row_bytes() {
            memory.write(base, &packed[..row_bytes * self.height as usize]);
            return;
        }
        for (row_index, row) in packed
            .chunks(row_bytes)
            .take(self.height as usize)
            .enumerate()
        {
            memory.write(base + row_index as u64 * self.row_pitch, row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_textures_use_aligned_pitch() {
        let desc = ResourceDesc::texture_2d(10, 4, DxgiFormat::R16_UNorm)
            .set_layout(TextureLayout::RowMajor);
        let layout = SubresourceLayout::for_desc(&desc).unwrap();
        assert_eq!(layout.row_bytes(), 20);
        assert_eq!(layout.row_pitch, 256);
        assert_eq!(layout.size, 1024);

        let opaque = SubresourceLayout::for_desc(
            &desc.set_layout(TextureLayout::Unknown),
        )
        .unwrap();
        assert_eq!(opaque.row_pitch, 20);
    }

    #[test]
    fn budget_refuses_overcommit() {
        let budget = Arc::new(MemoryBudget::new(128 * 1024));
        let first = HeapMemory::allocate(64 * 1024, &budget).unwrap();
        assert_eq!(
            HeapMemory::allocate(128 * 1024, &budget).unwrap_err(),
            E_OUTOFMEMORY
        );
        drop(first);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn packed_rows_skip_pitch_padding() {
        let budget = Arc::new(MemoryBudget::new(1 << 20));
        let desc = ResourceDesc::texture_2d(2, 2, DxgiFormat::R8G8B8A8_UNorm)
            .set_layout(TextureLayout::RowMajor);
        let layout = SubresourceLayout::for_desc(&desc).unwrap();
        let memory = HeapMemory::allocate(layout.allocation_size(), &budget).unwrap();
        let pixels: Vec<u8> = (0..16).collect();
        layout.write_packed(&memory, 0, &pixels);
        assert_eq!(memory.read(256, 8), (8..16).collect::<Vec<u8>>());
        assert_eq!(layout.read_packed(&memory, 0), pixels);
    }
}
