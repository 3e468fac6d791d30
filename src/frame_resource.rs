//! Per-frame state that the CPU rewrites while earlier frames are in flight.

use std::marker::PhantomData;

use log::{trace, warn};

use crate::error::AoResult;
use crate::hbao::HbaoConstants;
use crate::queue::GpuDevice;
use crate::scene::{PassConstants, BACK_BUFFER_FORMAT};
use crate::ssao::SsaoConstants;
use crate::*;

/// An upload heap buffer holding `element_count` constant blocks, each
/// padded to the constant buffer placement alignment
pub struct UploadBuffer<T: ConstantData> {
    resource: Resource,
    element_count: usize,
    element_size: Bytes,
    _marker: PhantomData<T>,
}

impl<T: ConstantData> UploadBuffer<T> {
    pub fn new(device: &Device, element_count: usize, name: &str) -> DxResult<Self> {
        let element_size = Bytes(align_to_multiple(
            std::mem::size_of::<T>() as u64,
            CONSTANT_BUFFER_ALIGNMENT.0,
        ));
        let resource = device.create_committed_resource(
            &HeapProperties::default().set_type(HeapType::Upload),
            HeapFlags::None,
            &ResourceDesc::buffer(Bytes(element_size.0 * element_count as u64)),
            ResourceStates::GenericRead,
            None,
        )?;
        resource.set_name(name)?;

        Ok(Self {
            resource,
            element_count,
            element_size,
            _marker: PhantomData,
        })
    }

    pub fn copy_data(&self, index: usize, data: &T) -> DxResult<()> {
        if index >= self.element_count {
            warn!(
                "Constant element {} is out of range, the buffer holds {}",
                index, self.element_count
            );
            dx_fail!("UploadBuffer::copy_data", E_INVALIDARG);
        }
        self.resource.write_data(
            Bytes(self.element_size.0 * index as u64),
            as_byte_slice(data),
        )
    }

    pub fn gpu_address(&self, index: usize) -> GpuVirtualAddress {
        self.resource.get_gpu_virtual_address() + Bytes(self.element_size.0 * index as u64)
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn element_size(&self) -> Bytes {
        self.element_size
    }
}

/// Constant buffers the engines read on one device
pub struct DeviceConstants {
    pub ssao: UploadBuffer<SsaoConstants>,
    pub hbao: UploadBuffer<HbaoConstants>,
}

impl DeviceConstants {
    fn new(gpu: &GpuDevice, index: usize) -> DxResult<Self> {
        Ok(Self {
            ssao: UploadBuffer::new(
                gpu.device(),
                1,
                &format!("SSAO constants {} on '{}'", index, gpu.name()),
            )?,
            hbao: UploadBuffer::new(
                gpu.device(),
                1,
                &format!("HBAO constants {} on '{}'", index, gpu.name()),
            )?,
        })
    }
}

/// Everything one frame in flight owns. A slot may only be rewritten after
/// both of its fence values have completed.
pub struct FrameResource {
    index: usize,
    pub pass_constants: UploadBuffer<PassConstants>,
    pub prime_constants: DeviceConstants,
    pub second_constants: DeviceConstants,
    back_buffer: Resource,
    back_buffer_rtv_heap: DescriptorHeap,
    /// Last prime queue fence value of this frame, 0 if never submitted
    pub prime_fence_value: u64,
    /// Last second queue fence value of this frame, 0 if never submitted
    pub second_fence_value: u64,
}

impl FrameResource {
    pub fn new(
        index: usize,
        prime: &GpuDevice,
        second: &GpuDevice,
        width: u32,
        height: u32,
    ) -> AoResult<Self> {
        let device = prime.device();
        let back_buffer_rtv_heap = device.create_descriptor_heap(
            &DescriptorHeapDesc::default()
                .set_type(DescriptorHeapType::RTV)
                .set_num_descriptors(Elements(1)),
        )?;
        back_buffer_rtv_heap.set_name(&format!("Back buffer {} RTV heap", index))?;

        let resource = Self {
            index,
            pass_constants: UploadBuffer::new(
                device,
                1,
                &format!("Pass constants {}", index),
            )?,
            prime_constants: DeviceConstants::new(prime, index)?,
            second_constants: DeviceConstants::new(second, index)?,
            back_buffer: Self::create_back_buffer(device, index, width, height)?,
            back_buffer_rtv_heap,
            prime_fence_value: 0,
            second_fence_value: 0,
        };
        resource.create_back_buffer_view(device)?;
        trace!("Created frame resource {} at {}x{}", index, width, height);
        Ok(resource)
    }

    fn create_back_buffer(
        device: &Device,
        index: usize,
        width: u32,
        height: u32,
    ) -> DxResult<Resource> {
        let back_buffer = device.create_committed_resource(
            &HeapProperties::default(),
            HeapFlags::None,
            &ResourceDesc::texture_2d(width, height, BACK_BUFFER_FORMAT)
                .set_flags(ResourceFlags::AllowRenderTarget),
            ResourceStates::Common,
            None,
        )?;
        back_buffer.set_name(&format!("Back buffer {}", index))?;
        Ok(back_buffer)
    }

    fn create_back_buffer_view(&self, device: &Device) -> DxResult<()> {
        device.create_render_target_view(
            &self.back_buffer,
            None,
            self.back_buffer_rtv_heap.get_cpu_descriptor_handle_for_heap_start(),
        )
    }

    /// Recreates the back buffer. The caller makes sure the GPU is done with
    /// the old one.
    pub fn resize(&mut self, prime: &GpuDevice, width: u32, height: u32) -> AoResult<()> {
        self.back_buffer = Self::create_back_buffer(prime.device(), self.index, width, height)?;
        self.create_back_buffer_view(prime.device())?;
        Ok(())
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn back_buffer(&self) -> &Resource {
        &self.back_buffer
    }

    pub fn back_buffer_rtv(&self) -> CpuDescriptorHandle {
        self.back_buffer_rtv_heap
            .get_cpu_descriptor_handle_for_heap_start()
    }

    /// Blocks until the GPU work recorded the last time this slot was used
    /// has finished on both devices
    pub fn wait_until_free(&self, prime: &GpuDevice, second: &GpuDevice) -> DxResult<()> {
        self.wait_for(prime, self.prime_fence_value)?;
        self.wait_for(second, self.second_fence_value)
    }

    /// Like `wait_until_free`, for a frame that leaves the second device's
    /// constants untouched
    pub fn wait_until_prime_free(&self, prime: &GpuDevice) -> DxResult<()> {
        self.wait_for(prime, self.prime_fence_value)
    }

    fn wait_for(&self, gpu: &GpuDevice, fence_value: u64) -> DxResult<()> {
        if fence_value != 0 && !gpu.queue().is_finished(fence_value) {
            trace!(
                "Frame {} waits for '{}' to reach {}",
                self.index,
                gpu.name(),
                fence_value
            );
            gpu.queue().wait_for_fence_value(fence_value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::create_device_pair;

    #[repr(C)]
    #[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct TestConstants {
        values: [u32; 4],
    }

    #[test]
    fn elements_are_placed_at_constant_buffer_alignment() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, _) = create_device_pair(&factory).expect("Cannot create devices");
        let buffer: UploadBuffer<TestConstants> =
            UploadBuffer::new(prime.device(), 3, "Test constants").expect("Cannot create buffer");

        assert_eq!(buffer.element_size(), CONSTANT_BUFFER_ALIGNMENT);
        assert_eq!(
            buffer.gpu_address(2).0 - buffer.gpu_address(0).0,
            2 * CONSTANT_BUFFER_ALIGNMENT.0
        );

        let data = TestConstants { values: [1, 2, 3, 4] };
        buffer.copy_data(1, &data).expect("Cannot copy constants");
        let bytes = buffer
            .resource()
            .read_data(
                CONSTANT_BUFFER_ALIGNMENT,
                Bytes::from(std::mem::size_of::<TestConstants>()),
            )
            .expect("Cannot read constants back");
        assert_eq!(from_byte_slice::<TestConstants>(&bytes), Some(data));
    }

    #[test]
    fn out_of_range_copy_is_rejected() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, _) = create_device_pair(&factory).expect("Cannot create devices");
        let buffer: UploadBuffer<TestConstants> =
            UploadBuffer::new(prime.device(), 1, "Test constants").expect("Cannot create buffer");
        let error = buffer
            .copy_data(1, &TestConstants::default())
            .expect_err("Copy past the end succeeded");
        assert_eq!(error.code(), E_INVALIDARG);
    }

    #[test]
    fn fresh_frame_is_free() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
        let frame = FrameResource::new(0, &prime, &second, 32, 16).expect("Cannot create frame");
        assert_eq!((frame.prime_fence_value, frame.second_fence_value), (0, 0));
        frame
            .wait_until_free(&prime, &second)
            .expect("Fresh frame has nothing to wait for");
        assert_eq!(frame.back_buffer().get_desc().width(), 32);
    }
}
