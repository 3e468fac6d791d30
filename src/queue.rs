//! Fence-tracked command queues and the device pair the demo runs on.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{info, trace};

use crate::shader::TextureView;
use crate::*;

/// Non-blocking view of a queue's progress
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    /// Work up to this fence value has been submitted but not finished
    Submitted(u64),
}

impl QueueState {
    /// Advances to `Idle` once the queue's fence passed the submitted value
    pub fn poll(self, queue: &GpuQueue) -> Self {
        match self {
            QueueState::Submitted(value) if queue.is_finished(value) => {
                QueueState::Idle
            }
            state => state,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == QueueState::Idle
    }
}

/// A command queue paired with the fence it signals after every submission
pub struct GpuQueue {
    device: Device,
    queue: CommandQueue,
    fence: Fence,
    list_type: CommandListType,
    next_fence_value: AtomicU64,
    last_submitted: AtomicU64,
    name: String,
}

impl GpuQueue {
    pub fn new(
        device: &Device,
        list_type: CommandListType,
        name: &str,
    ) -> DxResult<Self> {
        let queue = device.create_command_queue(
            &CommandQueueDesc::default().set_type(list_type),
        )?;
        queue.set_name(name)?;
        let fence = device.create_fence(0, FenceFlags::None)?;
        fence.set_name(&format!("{} fence", name))?;
        trace!("Created queue '{}'", name);

        Ok(Self {
            device: device.clone(),
            queue,
            fence,
            list_type,
            next_fence_value: AtomicU64::new(1),
            last_submitted: AtomicU64::new(0),
            name: name.to_owned(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A fresh, open command list of this queue's type
    pub fn get_command_list(&self) -> DxResult<CommandList> {
        let list = self.device.create_command_list(self.list_type)?;
        list.set_name(&format!("{} list", self.name))?;
        Ok(list)
    }

    /// Closes `list` if still open, submits it and returns the fence value
    /// that marks its completion
    pub fn execute_command_list(&self, list: &mut CommandList) -> DxResult<u64> {
        if !list.is_closed() {
            list.close()?;
        }
        self.queue.execute_command_lists(std::slice::from_ref(list))?;
        self.signal()
    }

    pub fn signal(&self) -> DxResult<u64> {
        let value = self.next_fence_value.fetch_add(1, Ordering::AcqRel);
        self.queue.signal(&self.fence, value)?;
        self.last_submitted.store(value, Ordering::Release);
        Ok(value)
    }

    pub fn completed_value(&self) -> u64 {
        self.fence.get_completed_value()
    }

    pub fn is_finished(&self, fence_value: u64) -> bool {
        self.completed_value() >= fence_value
    }

    pub fn wait_for_fence_value(&self, fence_value: u64) -> DxResult<()> {
        if self.is_finished(fence_value) {
            return Ok(());
        }
        let event = Event::default();
        self.fence.set_event_on_completion(fence_value, &event)?;
        event.wait(None);
        Ok(())
    }

    /// Blocks until everything submitted so far has executed
    pub fn flush(&self) -> DxResult<()> {
        let value = self.signal()?;
        self.wait_for_fence_value(value)
    }

    pub fn state(&self) -> QueueState {
        QueueState::Submitted(self.last_submitted.load(Ordering::Acquire))
            .poll(self)
    }

    /// GPU-side wait on a fence another queue signals
    pub fn wait_for_shared(&self, fence: &Fence, value: u64) -> DxResult<()> {
        self.queue.wait(fence, value)
    }

    pub fn signal_shared(&self, fence: &Fence, value: u64) -> DxResult<()> {
        self.queue.signal(fence, value)
    }
}

/// A device with its direct queue
pub struct GpuDevice {
    device: Device,
    queue: GpuQueue,
    name: String,
}

impl GpuDevice {
    pub fn new(adapter: &Adapter) -> DxResult<Self> {
        let name = adapter.get_desc().description.clone();
        let device = Device::new(adapter)?;
        device.set_name(&name)?;
        let queue = GpuQueue::new(
            &device,
            CommandListType::Direct,
            &format!("{} direct queue", name),
        )?;
        Ok(Self {
            device,
            queue,
            name,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &GpuQueue {
        &self.queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info_queue(&self) -> InfoQueue {
        InfoQueue::new(&self.device)
    }

    pub fn flush(&self) -> DxResult<()> {
        self.queue.flush()
    }

    /// Copies a texture into a readback buffer and decodes it. Blocks until
    /// the copy has executed.
    pub fn read_texture(&self, texture: &Resource) -> DxResult<TextureView> {
        let desc = texture.get_desc();
        let (footprints, num_rows, row_sizes, total_bytes) =
            self.device.get_copyable_footprints(&desc, 0, 1, Bytes(0))?;
        let readback = self.device.create_committed_resource(
            &HeapProperties::default().set_type(HeapType::Readback),
            HeapFlags::None,
            &ResourceDesc::buffer(total_bytes),
            ResourceStates::CopyDest,
            None,
        )?;
        readback.set_name("Readback buffer")?;

        let previous_state = texture.state();
        let mut list = self.queue.get_command_list()?;
        list.transition_barrier(texture, ResourceStates::CopySource);
        list.flush_resource_barriers();
        list.copy_texture_region(
            TextureCopyLocation::new_placed_footprint(&readback, footprints[0]),
            TextureCopyLocation::new_subresource_index(texture, 0),
        );
        list.transition_barrier(texture, previous_state);
        list.flush_resource_barriers();
        self.queue.execute_command_list(&mut list)?;
        self.queue.flush()?;

        let row_pitch = u64::from(footprints[0].footprint().row_pitch());
        let mut packed = Vec::with_capacity((row_sizes[0].0 * u64::from(num_rows[0])) as usize);
        for row in 0..u64::from(num_rows[0]) {
            packed.extend(readback.read_data(
                Bytes(footprints[0].offset() + row * row_pitch),
                row_sizes[0],
            )?);
        }
        Ok(TextureView::from_bytes(
            desc.width() as u32,
            desc.height(),
            desc.format(),
            &packed,
        ))
    }
}

/// Picks the two hardware adapters to run on, the one with more dedicated
/// memory first. Missing hardware adapters are replaced by the software
/// rasterizer.
pub fn create_device_pair(factory: &Factory) -> DxResult<(GpuDevice, GpuDevice)> {
    let mut adapters: Vec<Adapter> = factory
        .enum_adapters()
        .into_iter()
        .filter(|adapter| !adapter.is_software())
        .collect();
    adapters.sort_by(|lhs, rhs| {
        rhs.get_desc()
            .dedicated_video_memory
            .cmp(&lhs.get_desc().dedicated_video_memory)
    });
    while adapters.len() < 2 {
        adapters.push(factory.enum_warp_adapter()?);
    }

    let prime = GpuDevice::new(&adapters[0])?;
    let second = GpuDevice::new(&adapters[1])?;
    info!(
        "Enumerated adapters: \n\tPrime device: {}\n\tSecond device: {}",
        prime.name(),
        second.name()
    );
    Ok((prime, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_device() -> GpuDevice {
        let factory = Factory::new().expect("Cannot create factory");
        let adapter = factory.enum_adapters().remove(0);
        GpuDevice::new(&adapter).expect("Cannot create device")
    }

    #[test]
    fn fence_values_increase_per_submission() {
        let gpu = single_device();
        let mut first = gpu.queue().get_command_list().expect("Cannot get list");
        let mut second = gpu.queue().get_command_list().expect("Cannot get list");
        let first_value = gpu
            .queue()
            .execute_command_list(&mut first)
            .expect("Cannot execute");
        let second_value = gpu
            .queue()
            .execute_command_list(&mut second)
            .expect("Cannot execute");
        assert!(second_value > first_value);

        gpu.queue()
            .wait_for_fence_value(second_value)
            .expect("Cannot wait");
        assert!(gpu.queue().is_finished(first_value));
        assert!(gpu.queue().state().is_idle());
    }

    #[test]
    fn blocked_queue_reports_submitted_state() {
        let gpu = single_device();
        let gate = gpu
            .device()
            .create_fence(0, FenceFlags::None)
            .expect("Cannot create fence");
        gpu.queue().wait_for_shared(&gate, 1).expect("Cannot wait");
        let value = gpu.queue().signal().expect("Cannot signal");

        let state = gpu.queue().state();
        assert_eq!(state, QueueState::Submitted(value));
        assert!(!state.poll(gpu.queue()).is_idle());

        gate.signal(1).expect("Cannot signal gate");
        gpu.queue().wait_for_fence_value(value).expect("Cannot wait");
        assert!(state.poll(gpu.queue()).is_idle());
    }

    #[test]
    fn device_pair_prefers_hardware_adapters() {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
        assert_eq!(prime.name(), "Software Adapter 0");
        assert_eq!(second.name(), "Software Adapter 1");
    }

    #[test]
    fn device_pair_falls_back_to_rasterizer() {
        let factory = Factory::with_adapters(&[
            AdapterDesc::default().set_description("Only Adapter"),
            AdapterDesc::default()
                .set_description("Rasterizer")
                .set_flags(AdapterFlags::Software),
        ])
        .expect("Cannot create factory");
        let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
        assert_eq!(prime.name(), "Only Adapter");
        assert_eq!(second.name(), "Rasterizer");
    }
}
