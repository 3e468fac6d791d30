use mgpu_ssao::config::{AoConfig, AoMode};
use mgpu_ssao::orchestrator::{DualGpuFrameOrchestrator, FrameOutcome};
use mgpu_ssao::queue::create_device_pair;
use mgpu_ssao::scene::SceneKind;
use mgpu_ssao::*;
use std::thread;
use std::time::{Duration, Instant};

fn orchestrator(mode: AoMode, frames_in_flight: usize) -> DualGpuFrameOrchestrator {
    let factory = Factory::new().expect("Cannot create factory");
    let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
    DualGpuFrameOrchestrator::with_scene(
        AoConfig::default()
            .set_size(32, 32)
            .set_mode(mode)
            .set_frames_in_flight(frames_in_flight),
        prime,
        second,
        SceneKind::Flat { depth: 0.5 },
    )
    .expect("Cannot create orchestrator")
}

#[test]
fn toggling_modes_never_regresses_fence_values() {
    let mut orchestrator = orchestrator(AoMode::Native, 3);
    let mut previous = orchestrator.frame_fence_values();

    for frame in 0..12 {
        if frame % 4 == 3 {
            orchestrator.toggle_mode().expect("Cannot toggle mode");
        }
        orchestrator.render_frame().expect("Cannot render frame");

        let current = orchestrator.frame_fence_values();
        for (slot, (before, after)) in previous.iter().zip(current.iter()).enumerate() {
            assert!(
                after.0 >= before.0 && after.1 >= before.1,
                "slot {} went from {:?} to {:?}",
                slot,
                before,
                after
            );
        }
        previous = current;
    }

    let stats = orchestrator.stats();
    assert_eq!(stats.frames, 12);
    assert_eq!(stats.native_frames + stats.shared_frames + stats.skipped_second_frames, 12);
    assert!(stats.shared_frames > 0 && stats.native_frames > 0);
}

#[test]
fn busy_second_device_is_not_waited_for() {
    let mut orchestrator = orchestrator(AoMode::Shared, 2);
    assert_eq!(
        orchestrator.render_frame().expect("Cannot render frame"),
        FrameOutcome::Shared
    );
    orchestrator.flush().expect("Cannot flush");

    // Stall the second queue behind a fence nobody signals yet
    let gate = orchestrator
        .second()
        .device()
        .create_fence(0, FenceFlags::None)
        .expect("Cannot create fence");
    orchestrator
        .second()
        .queue()
        .wait_for_shared(&gate, 1)
        .expect("Cannot queue wait");
    orchestrator
        .second()
        .queue()
        .signal()
        .expect("Cannot signal");

    for _ in 0..3 {
        assert_eq!(
            orchestrator.render_frame().expect("Cannot render frame"),
            FrameOutcome::SharedReused
        );
    }
    assert_eq!(orchestrator.stats().skipped_second_frames, 3);
    orchestrator
        .prime()
        .flush()
        .expect("The prime device waited for the second one");

    gate.signal(1).expect("Cannot open the gate");
    orchestrator.flush().expect("Cannot flush");
    assert_eq!(
        orchestrator.render_frame().expect("Cannot render frame"),
        FrameOutcome::Shared
    );
    assert_eq!(orchestrator.stats().shared_frames, 2);
}

#[test]
fn slots_wait_for_their_previous_work() {
    let mut orchestrator = orchestrator(AoMode::Shared, 2);
    for _ in 0..5 {
        orchestrator.render_frame().expect("Cannot render frame");
    }
    orchestrator.flush().expect("Cannot flush");
    let prime_completed = orchestrator.prime().queue().completed_value();
    let second_completed = orchestrator.second().queue().completed_value();
    for (prime, second) in orchestrator.frame_fence_values() {
        assert!(prime > 0 && prime <= prime_completed);
        assert!(second <= second_completed);
    }
}

#[test]
fn stalled_second_device_does_not_hold_back_the_prime_queue() {
    let mut orchestrator = orchestrator(AoMode::Shared, 2);

    // Stall the second queue before it receives any work
    let gate = orchestrator
        .second()
        .device()
        .create_fence(0, FenceFlags::None)
        .expect("Cannot create fence");
    orchestrator
        .second()
        .queue()
        .wait_for_shared(&gate, 1)
        .expect("Cannot queue wait");

    // The first frame hands its inputs over, the rest find the queue busy
    assert_eq!(
        orchestrator.render_frame().expect("Cannot render frame"),
        FrameOutcome::Shared
    );
    for _ in 0..4 {
        assert_eq!(
            orchestrator.render_frame().expect("Cannot render frame"),
            FrameOutcome::SharedReused
        );
    }

    let marker = orchestrator.prime().queue().signal().expect("Cannot signal");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !orchestrator.prime().queue().is_finished(marker) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(
        orchestrator.prime().queue().is_finished(marker),
        "prime queue stopped at {} waiting for the second device",
        orchestrator.prime().queue().completed_value()
    );

    gate.signal(1).expect("Cannot open the gate");
    orchestrator.flush().expect("Cannot flush");
    assert_eq!(
        orchestrator.render_frame().expect("Cannot render frame"),
        FrameOutcome::Shared
    );
    let ambient = orchestrator
        .read_ambient_map()
        .expect("Cannot read the ambient map");
    assert!(ambient
        .texels()
        .iter()
        .all(|texel| texel[0] >= 0. && texel[0] <= 1.));
}
