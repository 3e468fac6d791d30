//! Resources backed by one heap that two adapters can see.
//!
//! The heap is allocated on the prime device with the shared cross-adapter
//! flags, exported through a shared handle and opened on the second
//! device. Each side then places its own resource at offset zero, so both
//! resources alias the same bytes.

use log::{debug, info, trace};

use crate::ao_resources::AoMaps;
use crate::error::{AoError, AoResult};
use crate::queue::GpuDevice;
use crate::*;

/// Heap footprint a cross-adapter copy of `desc` needs on `device`
pub fn required_heap_size(device: &Device, desc: &ResourceDesc) -> DxResult<Bytes> {
    let (footprints, num_rows, _, total_bytes) =
        device.get_copyable_footprints(desc, 0, 1, Bytes(0))?;
    let row_pitch = u64::from(footprints[0].footprint().row_pitch());
    let pitched = align_to_multiple(
        row_pitch * u64::from(num_rows[0]),
        DEFAULT_RESOURCE_ALIGNMENT.0,
    );
    Ok(Bytes(pitched.max(total_bytes.0)))
}

fn cross_adapter_desc(desc: &ResourceDesc) -> ResourceDesc {
    desc.set_flags(ResourceFlags::AllowCrossAdapter)
        .set_layout(TextureLayout::RowMajor)
}

struct SharedHeaps {
    prime: Heap,
    second: Heap,
    size: Bytes,
}

impl SharedHeaps {
    fn create(
        prime: &Device,
        second: &Device,
        size: Bytes,
        name: &str,
    ) -> DxResult<Self> {
        let prime_heap = prime.create_heap(
            &HeapDesc::default()
                .set_size_in_bytes(size)
                .set_properties(&HeapProperties::default().set_type(HeapType::Default))
                .set_alignment(DEFAULT_RESOURCE_ALIGNMENT)
                .set_flags(HeapFlags::Shared | HeapFlags::SharedCrossAdapter),
        )?;
        prime_heap.set_name(&format!("{} prime heap", name))?;

        let handle = prime.create_shared_handle(&prime_heap.clone().into(), name)?;
        let opened = second.open_shared_heap_handle(&handle);
        // The handle is only needed to open the heap, close it either way
        handle.close()?;
        let second_heap = opened?;
        second_heap.set_name(&format!("{} second heap", name))?;

        trace!(
            "Shared {} bytes of heap memory for '{}' across adapters",
            size.0,
            name
        );
        Ok(Self {
            prime: prime_heap,
            second: second_heap,
            size,
        })
    }
}

/// A pair of resources, one per device, over the same cross-adapter heap
pub struct SharedHeapResource {
    prime_device: Device,
    second_device: Device,
    desc: ResourceDesc,
    prime_extra_flags: ResourceFlags,
    name: String,
    heaps: SharedHeaps,
    prime_resource: Option<Resource>,
    shared_resource: Option<Resource>,
}

impl SharedHeapResource {
    pub fn create(
        desc: &ResourceDesc,
        prime: &GpuDevice,
        second: &GpuDevice,
        name: &str,
        prime_extra_flags: ResourceFlags,
    ) -> DxResult<Self> {
        let desc = cross_adapter_desc(desc);
        let size = required_heap_size(prime.device(), &desc)?;
        let heaps = SharedHeaps::create(prime.device(), second.device(), size, name)?;

        let mut resource = Self {
            prime_device: prime.device().clone(),
            second_device: second.device().clone(),
            desc,
            prime_extra_flags,
            name: name.to_owned(),
            heaps,
            prime_resource: None,
            shared_resource: None,
        };
        resource.place_views()?;
        Ok(resource)
    }

    fn place_views(&mut self) -> DxResult<()> {
        let prime_desc = self
            .desc
            .set_flags(self.desc.flags() | self.prime_extra_flags);
        let prime_resource = self.prime_device.create_placed_resource(
            &self.heaps.prime,
            Bytes(0),
            &prime_desc,
            ResourceStates::Common,
            None,
        )?;
        prime_resource.set_name(&format!("{} prime", self.name))?;

        let shared_resource = self.second_device.create_placed_resource(
            &self.heaps.second,
            Bytes(0),
            &self.desc,
            ResourceStates::Common,
            None,
        )?;
        shared_resource.set_name(&format!("{} shared", self.name))?;

        self.prime_resource = Some(prime_resource);
        self.shared_resource = Some(shared_resource);
        Ok(())
    }

    /// Re-places both views at the new size. The heaps are kept while the
    /// new footprint fits and reallocated otherwise.
    pub fn resize(&mut self, width: u32, height: u32) -> DxResult<()> {
        self.reset();
        self.desc = self.desc.set_width(u64::from(width)).set_height(height);

        let size = required_heap_size(&self.prime_device, &self.desc)?;
        if size > self.heaps.size {
            info!(
                "Reallocating '{}' heap: {} bytes do not fit into {}",
                self.name, size.0, self.heaps.size.0
            );
            self.heaps =
                SharedHeaps::create(&self.prime_device, &self.second_device, size, &self.name)?;
        } else {
            debug!("Reusing the '{}' heap for {}x{}", self.name, width, height);
        }
        self.place_views()
    }

    /// Drops both views. The heaps stay alive until the resource is dropped.
    pub fn reset(&mut self) {
        self.prime_resource = None;
        self.shared_resource = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.prime_resource.is_some() && self.shared_resource.is_some()
    }

    /// View placed on the prime device
    pub fn prime_resource(&self) -> Option<&Resource> {
        self.prime_resource.as_ref()
    }

    /// View placed on the second device
    pub fn shared_resource(&self) -> Option<&Resource> {
        self.shared_resource.as_ref()
    }

    pub fn desc(&self) -> ResourceDesc {
        self.desc
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn heap_size(&self) -> Bytes {
        self.heaps.size
    }

    pub fn prime_heap(&self) -> &Heap {
        &self.heaps.prime
    }

    pub fn second_heap(&self) -> &Heap {
        &self.heaps.second
    }

    fn views(&self) -> AoResult<(&Resource, &Resource)> {
        match (&self.prime_resource, &self.shared_resource) {
            (Some(prime), Some(shared)) => Ok((prime, shared)),
            _ => Err(AoError::NotInitialized("shared heap resource")),
        }
    }
}

/// Normal, depth and ambient maps mirrored across the two devices
#[derive(Default)]
pub struct CrossAdapterResourceSet {
    normal: Option<SharedHeapResource>,
    depth: Option<SharedHeapResource>,
    ambient: Option<SharedHeapResource>,
}

impl CrossAdapterResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the shared maps from the prime device's map descriptions
    pub fn initialize(
        &mut self,
        prime_maps: Option<&AoMaps>,
        prime: &GpuDevice,
        second: &GpuDevice,
    ) -> AoResult<()> {
        let maps = prime_maps.ok_or(AoError::NotInitialized("prime ambient occlusion maps"))?;
        self.normal = Some(SharedHeapResource::create(
            &maps.normal.get_desc(),
            prime,
            second,
            "Shared normal map",
            ResourceFlags::None,
        )?);
        self.depth = Some(SharedHeapResource::create(
            &maps.depth.get_desc(),
            prime,
            second,
            "Shared depth map",
            ResourceFlags::None,
        )?);
        self.ambient = Some(SharedHeapResource::create(
            &maps.ambient[0].get_desc(),
            prime,
            second,
            "Shared ambient map",
            ResourceFlags::None,
        )?);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        [&self.normal, &self.depth, &self.ambient]
            .iter()
            .all(|resource| resource.as_ref().map_or(false, SharedHeapResource::is_initialized))
    }

    pub fn on_resize(&mut self, width: u32, height: u32) -> AoResult<()> {
        for resource in [&mut self.normal, &mut self.depth, &mut self.ambient] {
            match resource {
                Some(resource) => resource.resize(width, height)?,
                None => return Err(AoError::NotInitialized("cross-adapter resource set")),
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for resource in [&mut self.normal, &mut self.depth, &mut self.ambient]
            .into_iter()
            .flatten()
        {
            resource.reset();
        }
    }

    fn get<'a>(
        resource: &'a Option<SharedHeapResource>,
    ) -> AoResult<&'a SharedHeapResource> {
        resource
            .as_ref()
            .ok_or(AoError::NotInitialized("cross-adapter resource set"))
    }

    pub fn normal(&self) -> AoResult<&SharedHeapResource> {
        Self::get(&self.normal)
    }

    pub fn depth(&self) -> AoResult<&SharedHeapResource> {
        Self::get(&self.depth)
    }

    pub fn ambient(&self) -> AoResult<&SharedHeapResource> {
        Self::get(&self.ambient)
    }

    /// (prime view, second view) of the shared normal map
    pub fn normal_views(&self) -> AoResult<(&Resource, &Resource)> {
        self.normal()?.views()
    }

    pub fn depth_views(&self) -> AoResult<(&Resource, &Resource)> {
        self.depth()?.views()
    }

    pub fn ambient_views(&self) -> AoResult<(&Resource, &Resource)> {
        self.ambient()?.views()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::create_device_pair;

    #[test]
    fn heap_size_covers_pitched_rows() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, _) = create_device_pair(&factory).expect("Cannot create devices");
        let desc = cross_adapter_desc(&ResourceDesc::texture_2d(
            100,
            10,
            DxgiFormat::R16_UNorm,
        ));
        let size = required_heap_size(prime.device(), &desc).expect("Cannot query footprint");
        assert_eq!(size, DEFAULT_RESOURCE_ALIGNMENT);
    }

    #[test]
    fn views_alias_the_same_memory() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
        let resource = SharedHeapResource::create(
            &ResourceDesc::texture_2d(4, 4, DxgiFormat::R8G8B8A8_UNorm),
            &prime,
            &second,
            "Test map",
            ResourceFlags::None,
        )
        .expect("Cannot create shared resource");

        assert!(resource.is_initialized());
        assert_eq!(
            resource.prime_heap().allocation_id(),
            resource.second_heap().allocation_id()
        );
        let prime_view = resource.prime_resource().expect("No prime view");
        let shared_view = resource.shared_resource().expect("No shared view");
        assert_eq!(prime_view.get_desc().layout(), TextureLayout::RowMajor);
        assert_eq!(prime_view.state(), ResourceStates::Common);
        assert_eq!(prime_view.allocation_id(), shared_view.allocation_id());
    }

    #[test]
    fn reset_keeps_heaps() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
        let mut resource = SharedHeapResource::create(
            &ResourceDesc::texture_2d(8, 8, DxgiFormat::R16_UNorm),
            &prime,
            &second,
            "Test map",
            ResourceFlags::None,
        )
        .expect("Cannot create shared resource");
        let heap_id = resource.prime_heap().allocation_id();

        resource.reset();
        assert!(!resource.is_initialized());
        assert!(resource.prime_resource().is_none());
        assert_eq!(resource.prime_heap().allocation_id(), heap_id);
    }

    #[test]
    fn uninitialized_set_refuses_resize() {
        let mut set = CrossAdapterResourceSet::new();
        assert!(!set.is_initialized());
        assert!(matches!(
            set.on_resize(16, 16),
            Err(AoError::NotInitialized(_))
        ));
    }
}
