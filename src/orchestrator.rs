//! Drives frames across the two devices.
//!
//! In native mode the prime device renders the scene, computes ambient
//! occlusion and composites in one command list. In shared mode the prime
//! device renders normals and depth into the cross-adapter heaps, the second
//! device computes ambient occlusion from them and writes the result back
//! through a third shared heap, and the prime device composites with it.
//! Two shared fences order the hand-offs: `inputs_ready` is signalled by the
//! prime queue and waited on by the second queue, `ambient_ready` the other
//! way round.
//!
//! The prime queue never waits on work the second device has not finished.
//! A delivered ambient map is pulled into the prime device's own map at the
//! start of a later frame, once its `ambient_ready` value has retired, and
//! the composite reads that copy. While the second queue is still busy the
//! frame skips the hand-off altogether.

use log::{debug, info, trace, warn};

use crate::ao_resources::{
    build_offset_vectors, DeviceRole, AMBIENT_MAP_CLEAR, OFFSET_VECTOR_COUNT,
};
use crate::config::{AoConfig, AoMode, AoTechnique};
use crate::error::{AoError, AoResult};
use crate::frame_resource::{DeviceConstants, FrameResource};
use crate::hbao::{HbaoConstants, SharedHbao};
use crate::math::Camera;
use crate::queue::{GpuDevice, GpuQueue};
use crate::scene::{CompositePass, PassConstants, SceneKind, ScenePass};
use crate::shader::TextureView;
use crate::ssao::{AmbientOcclusionEngine, SharedSsao, SsaoConstants};
use crate::*;

/// A fence created on one device and opened on the other
struct CrossAdapterFence {
    signal_side: Fence,
    wait_side: Fence,
    value: u64,
}

impl CrossAdapterFence {
    fn create(signaller: &GpuDevice, waiter: &GpuDevice, name: &str) -> DxResult<Self> {
        let signal_side = signaller
            .device()
            .create_fence(0, FenceFlags::Shared | FenceFlags::SharedCrossAdapter)?;
        signal_side.set_name(name)?;

        let handle = signaller
            .device()
            .create_shared_handle(&signal_side.clone().into(), name)?;
        let opened = waiter.device().open_shared_fence_handle(&handle);
        handle.close()?;
        let wait_side = opened?;

        trace!(
            "Shared fence '{}' from '{}' to '{}'",
            name,
            signaller.name(),
            waiter.name()
        );
        Ok(Self {
            signal_side,
            wait_side,
            value: 0,
        })
    }

    /// Queues a signal of the next value and returns it
    fn signal(&mut self, queue: &GpuQueue) -> DxResult<u64> {
        self.value += 1;
        queue.signal_shared(&self.signal_side, self.value)?;
        Ok(self.value)
    }

    /// Makes `queue` wait for the last value queued by `signal`
    fn wait(&self, queue: &GpuQueue) -> DxResult<()> {
        queue.wait_for_shared(&self.wait_side, self.value)
    }

    /// Whether every signal queued so far has executed
    fn is_retired(&self) -> bool {
        self.signal_side.get_completed_value() >= self.value
    }
}

/// Records the copy of a delivered ambient map into the prime device's map
fn record_ambient_delivery(
    list: &mut CommandList,
    prime_ambient: &Resource,
    shared_ambient: &Resource,
) {
    list.transition_barrier(prime_ambient, ResourceStates::CopyDest);
    list.flush_resource_barriers();
    list.copy_resource(prime_ambient, shared_ambient);
    list.transition_barrier(prime_ambient, ResourceStates::PixelShaderResource);
    list.flush_resource_barriers();
}

/// How a frame was produced
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Everything ran on the prime device
    Native,
    /// The second device computed this frame's ambient map
    Shared,
    /// The second device was busy, the previous ambient map was reused
    SharedReused,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub native_frames: u64,
    pub shared_frames: u64,
    pub skipped_second_frames: u64,
}

pub struct DualGpuFrameOrchestrator {
    config: AoConfig,
    prime: GpuDevice,
    second: GpuDevice,
    engine: Box<dyn AmbientOcclusionEngine>,
    scene: ScenePass,
    composite: CompositePass,
    camera: Camera,
    offset_vectors: [[f32; 4]; OFFSET_VECTOR_COUNT],
    frames: Vec<FrameResource>,
    current_frame: usize,
    inputs_ready: CrossAdapterFence,
    ambient_ready: CrossAdapterFence,
    /// Last `ambient_ready` value whose map was copied to the prime device
    delivered_ambient: u64,
    stats: FrameStats,
}

fn create_engine(technique: AoTechnique) -> Box<dyn AmbientOcclusionEngine> {
    match technique {
        AoTechnique::Ssao => Box::new(SharedSsao::new()),
        AoTechnique::Hbao => Box::new(SharedHbao::new()),
    }
}

fn constants_address(technique: AoTechnique, constants: &DeviceConstants) -> GpuVirtualAddress {
    match technique {
        AoTechnique::Ssao => constants.ssao.gpu_address(0),
        AoTechnique::Hbao => constants.hbao.gpu_address(0),
    }
}

impl DualGpuFrameOrchestrator {
    pub fn new(config: AoConfig, prime: GpuDevice, second: GpuDevice) -> AoResult<Self> {
        Self::with_scene(config, prime, second, SceneKind::Procedural)
    }

    pub fn with_scene(
        config: AoConfig,
        prime: GpuDevice,
        second: GpuDevice,
        scene_kind: SceneKind,
    ) -> AoResult<Self> {
        config.validate()?;
        let (width, height) = (config.width, config.height);
        let input_layout = InputLayoutDesc::default();

        let mut engine = create_engine(config.technique);
        engine.initialize(&prime, &second, &input_layout, width, height)?;
        let scene = ScenePass::new(prime.device(), &input_layout, scene_kind)?;
        let composite = CompositePass::new(prime.device(), &input_layout)?;

        let mut camera = Camera::default();
        camera.set_aspect_ratio(width, height);

        let frames = (0..config.frames_in_flight)
            .map(|index| FrameResource::new(index, &prime, &second, width, height))
            .collect::<AoResult<Vec<_>>>()?;

        let inputs_ready = CrossAdapterFence::create(&prime, &second, "Inputs ready fence")?;
        let ambient_ready = CrossAdapterFence::create(&second, &prime, "Ambient ready fence")?;

        info!(
            "{} in {} mode at {}x{} on '{}' and '{}'",
            engine.name(),
            config.mode,
            width,
            height,
            prime.name(),
            second.name()
        );

        let orchestrator = Self {
            config,
            prime,
            second,
            engine,
            scene,
            composite,
            camera,
            offset_vectors: build_offset_vectors(&mut rand::thread_rng()),
            frames,
            current_frame: 0,
            inputs_ready,
            ambient_ready,
            delivered_ambient: 0,
            stats: FrameStats::default(),
        };
        orchestrator.clear_prime_ambient()?;
        Ok(orchestrator)
    }

    pub fn config(&self) -> &AoConfig {
        &self.config
    }

    pub fn mode(&self) -> AoMode {
        self.config.mode
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn prime(&self) -> &GpuDevice {
        &self.prime
    }

    pub fn second(&self) -> &GpuDevice {
        &self.second
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn set_offset_vectors(&mut self, offset_vectors: [[f32; 4]; OFFSET_VECTOR_COUNT]) {
        self.offset_vectors = offset_vectors;
    }

    /// (prime, second) fence values of every frame slot
    pub fn frame_fence_values(&self) -> Vec<(u64, u64)> {
        self.frames
            .iter()
            .map(|frame| (frame.prime_fence_value, frame.second_fence_value))
            .collect()
    }

    /// Blocks until both devices have executed everything submitted
    pub fn flush(&self) -> DxResult<()> {
        self.prime.flush()?;
        self.second.flush()
    }

    pub fn set_mode(&mut self, mode: AoMode) -> AoResult<()> {
        if self.config.mode == mode {
            return Ok(());
        }
        self.flush()?;
        self.discard_pending_ambient();
        info!("Switching ambient occlusion from {} to {} mode", self.config.mode, mode);
        self.config.mode = mode;
        Ok(())
    }

    pub fn toggle_mode(&mut self) -> AoResult<AoMode> {
        let mode = self.config.mode.toggled();
        self.set_mode(mode)?;
        Ok(mode)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> AoResult<()> {
        if width == 0 || height == 0 {
            return Err(AoError::Config(format!(
                "cannot resize to {}x{}",
                width, height
            )));
        }
        if (width, height) == (self.config.width, self.config.height) {
            debug!("Ignoring resize to the current size {}x{}", width, height);
            return Ok(());
        }
        self.flush()?;
        self.discard_pending_ambient();
        self.engine.on_resize(width, height)?;
        for frame in self.frames.iter_mut() {
            frame.resize(&self.prime, width, height)?;
        }
        self.clear_prime_ambient()?;
        self.camera.set_aspect_ratio(width, height);
        info!(
            "Resized from {}x{} to {}x{}",
            self.config.width, self.config.height, width, height
        );
        self.config.width = width;
        self.config.height = height;
        Ok(())
    }

    /// Drops ambient maps still waiting in the shared heap. Only called
    /// with both devices flushed.
    fn discard_pending_ambient(&mut self) {
        self.delivered_ambient = self.ambient_ready.value;
    }

    /// Fills the prime device's ambient map with "unoccluded" until the
    /// second device delivers one
    fn clear_prime_ambient(&self) -> AoResult<()> {
        let resources = self.engine.resources(DeviceRole::Prime);
        let (maps, views) = (resources.maps()?, resources.views()?);
        let mut list = self.prime.queue().get_command_list()?;
        list.transition_barrier(&maps.ambient[0], ResourceStates::RenderTarget);
        list.flush_resource_barriers();
        list.clear_render_target_view(views.ambient_rtv[0], AMBIENT_MAP_CLEAR);
        list.transition_barrier(&maps.ambient[0], ResourceStates::PixelShaderResource);
        list.flush_resource_barriers();
        self.prime.queue().execute_command_list(&mut list)?;
        Ok(())
    }

    /// An ambient map is ready to be pulled into the prime device once the
    /// second device has no delivery in flight and the last one is new
    fn ambient_pending(&self) -> bool {
        self.ambient_ready.is_retired() && self.ambient_ready.value > self.delivered_ambient
    }

    /// Records and submits one frame in the current mode
    pub fn render_frame(&mut self) -> AoResult<FrameOutcome> {
        let index = self.current_frame;
        let use_second =
            self.config.mode == AoMode::Shared && self.second.queue().state().is_idle();
        if use_second {
            self.frames[index].wait_until_free(&self.prime, &self.second)?;
        } else {
            // The second device's constants of this slot are left alone
            self.frames[index].wait_until_prime_free(&self.prime)?;
        }
        self.update_constants(index, use_second)?;

        let outcome = match self.config.mode {
            AoMode::Native => self.render_native(index)?,
            AoMode::Shared => self.render_shared(index, use_second)?,
        };

        self.current_frame = (index + 1) % self.frames.len();
        self.stats.frames += 1;
        Ok(outcome)
    }

    fn update_constants(&self, index: usize, use_second: bool) -> AoResult<()> {
        let (width, height) = (self.config.width, self.config.height);
        let frame = &self.frames[index];
        frame
            .pass_constants
            .copy_data(0, &PassConstants::new(&self.camera, width, height)?)?;

        match self.config.technique {
            AoTechnique::Ssao => {
                let constants = SsaoConstants::new(
                    &self.camera.projection(),
                    width,
                    height,
                    &self.config,
                    &self.offset_vectors,
                )?;
                frame.prime_constants.ssao.copy_data(0, &constants)?;
                if use_second {
                    frame.second_constants.ssao.copy_data(0, &constants)?;
                }
            }
            AoTechnique::Hbao => {
                let constants = HbaoConstants::new(&self.camera, width, height, &self.config)?;
                frame.prime_constants.hbao.copy_data(0, &constants)?;
                if use_second {
                    frame.second_constants.hbao.copy_data(0, &constants)?;
                }
            }
        }
        Ok(())
    }

    fn render_native(&mut self, index: usize) -> AoResult<FrameOutcome> {
        let size = (self.config.width, self.config.height);
        let frame = &self.frames[index];
        let resources = self.engine.resources(DeviceRole::Prime);
        let (maps, views) = (resources.maps()?, resources.views()?);

        let mut list = self.prime.queue().get_command_list()?;
        self.scene
            .record(&mut list, frame.pass_constants.gpu_address(0), maps, views, size);
        self.engine.compute(
            &mut list,
            constants_address(self.config.technique, &frame.prime_constants),
            DeviceRole::Prime,
            self.config.native_blur_count,
        )?;
        self.composite.record(
            &mut list,
            maps,
            views,
            frame.back_buffer(),
            frame.back_buffer_rtv(),
            size,
        );
        let fence_value = self.prime.queue().execute_command_list(&mut list)?;

        self.frames[index].prime_fence_value = fence_value;
        self.stats.native_frames += 1;
        Ok(FrameOutcome::Native)
    }

    fn render_shared(&mut self, index: usize, second_idle: bool) -> AoResult<FrameOutcome> {
        let size = (self.config.width, self.config.height);
        let technique = self.config.technique;
        let ambient_pending = self.ambient_pending();

        let cross = self.engine.cross_resources();
        let (shared_normal_prime, shared_normal_second) = cross.normal_views()?;
        let (shared_depth_prime, shared_depth_second) = cross.depth_views()?;
        let (shared_ambient_prime, shared_ambient_second) = cross.ambient_views()?;
        let prime_resources = self.engine.resources(DeviceRole::Prime);
        let (prime_maps, prime_views) = (prime_resources.maps()?, prime_resources.views()?);
        let frame = &self.frames[index];

        // The second device only writes the shared ambient map after the
        // `inputs_ready` signal queued below, so this copy cannot overlap it
        let mut list = self.prime.queue().get_command_list()?;
        if ambient_pending {
            self.ambient_ready.wait(self.prime.queue())?;
            record_ambient_delivery(&mut list, &prime_maps.ambient[0], shared_ambient_prime);
            self.delivered_ambient = self.ambient_ready.value;
        }
        self.scene.record(
            &mut list,
            frame.pass_constants.gpu_address(0),
            prime_maps,
            prime_views,
            size,
        );
        if second_idle {
            list.transition_barrier(&prime_maps.normal, ResourceStates::CopySource);
            list.transition_barrier(&prime_maps.depth, ResourceStates::CopySource);
            list.flush_resource_barriers();
            list.copy_resource(shared_normal_prime, &prime_maps.normal);
            list.copy_resource(shared_depth_prime, &prime_maps.depth);
        }
        self.composite.record(
            &mut list,
            prime_maps,
            prime_views,
            frame.back_buffer(),
            frame.back_buffer_rtv(),
            size,
        );
        let prime_fence_value = self.prime.queue().execute_command_list(&mut list)?;

        let mut second_fence_value = None;
        if second_idle {
            self.inputs_ready.signal(self.prime.queue())?;
            self.inputs_ready.wait(self.second.queue())?;

            let second_resources = self.engine.resources(DeviceRole::Second);
            let second_maps = second_resources.maps()?;
            let mut list = self.second.queue().get_command_list()?;
            list.transition_barrier(&second_maps.normal, ResourceStates::CopyDest);
            list.transition_barrier(&second_maps.depth, ResourceStates::CopyDest);
            list.flush_resource_barriers();
            list.copy_resource(&second_maps.normal, shared_normal_second);
            list.copy_resource(&second_maps.depth, shared_depth_second);

            self.engine.compute(
                &mut list,
                constants_address(technique, &frame.second_constants),
                DeviceRole::Second,
                self.config.shared_blur_count,
            )?;

            list.transition_barrier(&second_maps.ambient[0], ResourceStates::CopySource);
            list.flush_resource_barriers();
            list.copy_resource(shared_ambient_second, &second_maps.ambient[0]);
            second_fence_value = Some(self.second.queue().execute_command_list(&mut list)?);
            self.ambient_ready.signal(self.second.queue())?;
        } else {
            trace!(
                "'{}' is still busy, frame {} reuses the last delivered ambient map",
                self.second.name(),
                self.stats.frames
            );
        }

        let frame = &mut self.frames[index];
        frame.prime_fence_value = prime_fence_value;
        Ok(match second_fence_value {
            Some(fence_value) => {
                frame.second_fence_value = fence_value;
                self.stats.shared_frames += 1;
                FrameOutcome::Shared
            }
            None => {
                self.stats.skipped_second_frames += 1;
                FrameOutcome::SharedReused
            }
        })
    }

    fn last_frame(&self) -> &FrameResource {
        let count = self.frames.len();
        &self.frames[(self.current_frame + count - 1) % count]
    }

    /// The prime device's ambient map after all work finished, including
    /// a delivery from the second device no frame has picked up yet
    pub fn read_ambient_map(&mut self) -> AoResult<TextureView> {
        self.flush()?;
        if self.ambient_pending() {
            let (_, shared_ambient) = self.engine.cross_resources().ambient_views()?;
            let maps = self.engine.resources(DeviceRole::Prime).maps()?;
            let mut list = self.prime.queue().get_command_list()?;
            record_ambient_delivery(&mut list, &maps.ambient[0], shared_ambient);
            self.prime.queue().execute_command_list(&mut list)?;
            self.prime.flush()?;
            self.delivered_ambient = self.ambient_ready.value;
        }
        let maps = self.engine.resources(DeviceRole::Prime).maps()?;
        Ok(self.prime.read_texture(&maps.ambient[0])?)
    }

    /// The back buffer of the last rendered frame
    pub fn read_back_buffer(&self) -> AoResult<TextureView> {
        self.flush()?;
        Ok(self.prime.read_texture(self.last_frame().back_buffer())?)
    }
}

impl Drop for DualGpuFrameOrchestrator {
    fn drop(&mut self) {
        if let Err(error) = self.flush() {
            warn!("Cannot flush the devices on shutdown: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::create_device_pair;

    fn orchestrator(config: AoConfig) -> DualGpuFrameOrchestrator {
        let factory = Factory::new().expect("Cannot create factory");
        let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
        DualGpuFrameOrchestrator::new(config, prime, second).expect("Cannot create orchestrator")
    }

    #[test]
    fn native_frames_stay_on_the_prime_device() {
        let mut orchestrator = orchestrator(
            AoConfig::default()
                .set_size(32, 24)
                .set_mode(AoMode::Native)
                .set_frames_in_flight(2),
        );
        for _ in 0..3 {
            assert_eq!(
                orchestrator.render_frame().expect("Cannot render frame"),
                FrameOutcome::Native
            );
        }
        assert!(orchestrator
            .frame_fence_values()
            .iter()
            .all(|&(prime, second)| prime > 0 && second == 0));
        assert_eq!(orchestrator.stats().native_frames, 3);
    }

    #[test]
    fn shared_frames_use_both_devices() {
        let mut orchestrator = orchestrator(
            AoConfig::default()
                .set_size(32, 24)
                .set_mode(AoMode::Shared)
                .set_frames_in_flight(2),
        );
        assert_eq!(
            orchestrator.render_frame().expect("Cannot render frame"),
            FrameOutcome::Shared
        );
        let (prime, second) = orchestrator.frame_fence_values()[0];
        assert!(prime > 0 && second > 0);
    }

    #[test]
    fn mode_toggle_flips_between_modes() {
        let mut orchestrator = orchestrator(AoConfig::default().set_size(16, 16));
        let start = orchestrator.mode();
        assert_eq!(orchestrator.toggle_mode().expect("Cannot toggle"), start.toggled());
        assert_eq!(orchestrator.toggle_mode().expect("Cannot toggle"), start);
    }

    #[test]
    fn empty_resize_is_rejected() {
        let mut orchestrator = orchestrator(AoConfig::default().set_size(16, 16));
        assert!(matches!(orchestrator.resize(0, 16), Err(AoError::Config(_))));
    }
}
