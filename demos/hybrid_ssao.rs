use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use log::{error, info, warn};

use mgpu_ssao::benchmark::{BenchmarkEvent, BenchmarkService, WaitState};
use mgpu_ssao::config::{AoConfig, AoMode, AoTechnique};
use mgpu_ssao::orchestrator::DualGpuFrameOrchestrator;
use mgpu_ssao::queue::create_device_pair;
use mgpu_ssao::shader::TextureView;
use mgpu_ssao::Factory;

fn parse_size(size: &str) -> Option<(u32, u32)> {
    let mut parts = size.split('x');
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    match parts.next() {
        None => Some((width, height)),
        Some(_) => None,
    }
}

/// Binary PGM with one 8-bit sample per texel, taken from the red channel
fn write_pgm(path: &str, image: &TextureView) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write!(file, "P5\n{} {}\n255\n", image.width(), image.height())?;
    let bytes: Vec<u8> = image
        .texels()
        .iter()
        .map(|texel| (texel[0].max(0.).min(1.) * 255.).round() as u8)
        .collect();
    file.write_all(&bytes)?;
    file.flush()
}

fn main() {
    let command_args = clap::App::new("HybridSsaoSample")
        .arg(
            clap::Arg::with_name("size")
                .short("s")
                .takes_value(true)
                .value_name("WIDTHxHEIGHT")
                .help("Render target size"),
        )
        .arg(
            clap::Arg::with_name("technique")
                .short("t")
                .takes_value(true)
                .possible_values(&["ssao", "hbao"])
                .help("Ambient occlusion technique"),
        )
        .arg(
            clap::Arg::with_name("steps")
                .short("n")
                .takes_value(true)
                .value_name("NUMBER")
                .help("Stat steps per benchmark state"),
        )
        .arg(
            clap::Arg::with_name("frame_count")
                .short("f")
                .takes_value(true)
                .value_name("NUMBER")
                .help("Stop after <frame_count> frames"),
        )
        .arg(
            clap::Arg::with_name("output")
                .short("o")
                .takes_value(true)
                .value_name("FILE")
                .help("Write the final ambient map as a PGM image"),
        )
        .arg(
            clap::Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Verbosity level"),
        )
        .get_matches();

    let log_level = match command_args.occurrences_of("v") {
        0 => log::Level::Info,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(log_level).unwrap();

    let (width, height) = command_args
        .value_of("size")
        .map(|size| parse_size(size).expect("Cannot parse render target size"))
        .unwrap_or((320, 180));
    let technique = match command_args.value_of("technique") {
        Some("hbao") => AoTechnique::Hbao,
        _ => AoTechnique::Ssao,
    };
    let mut config = AoConfig::default()
        .set_size(width, height)
        .set_technique(technique)
        .set_mode(AoMode::Native);
    if let Some(steps) = command_args.value_of("steps") {
        config.benchmark_steps = steps.parse().expect("Cannot parse step count");
    }
    let frame_count = command_args
        .value_of("frame_count")
        .map(|count| count.parse::<u64>().expect("Cannot parse frame count"))
        .unwrap_or(std::u64::MAX);

    let factory = Factory::new().expect("Cannot create factory");
    let (prime, second) = create_device_pair(&factory).expect("Cannot create devices");
    let mut sample = DualGpuFrameOrchestrator::new(config.clone(), prime, second)
        .expect("Cannot create renderer");

    let mut benchmark = BenchmarkService::new();
    let native = benchmark.add_state(WaitState::new(
        "Native implementation",
        config.benchmark_steps,
        config.benchmark_time_per_step,
    ));
    let shared = benchmark.add_state(WaitState::new(
        "Hybrid implementation",
        config.benchmark_steps,
        config.benchmark_time_per_step,
    ));

    let mut summary = Vec::new();
    let mut events = benchmark.start();
    let mut last_frame = Instant::now();
    let mut current_frame: u64 = 0;
    while !benchmark.is_finished() && current_frame < frame_count {
        for event in events.drain(..) {
            match event {
                BenchmarkEvent::Enter { state, .. } => {
                    let mode = if state == native {
                        AoMode::Native
                    } else {
                        AoMode::Shared
                    };
                    sample.set_mode(mode).expect("Cannot switch mode");
                }
                BenchmarkEvent::Exit { state, stats } => summary.push((state, stats)),
                BenchmarkEvent::Stats { .. } => {}
            }
        }

        if let Err(err) = sample.render_frame() {
            error!("Frame {} failed: {}", current_frame, err);
            break;
        }
        current_frame += 1;

        let now = Instant::now();
        let delta_time = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;
        events = benchmark.tick(delta_time);
    }
    for event in events {
        if let BenchmarkEvent::Exit { state, stats } = event {
            summary.push((state, stats));
        }
    }

    for (state, stats) in summary.iter() {
        let name = if *state == shared { "Hybrid" } else { "Native" };
        info!(
            "{}: {} frames, fps min {:.1} max {:.1}, ms per frame min {:.3} max {:.3}",
            name, stats.frame_number, stats.min_fps, stats.max_fps, stats.min_mspf, stats.max_mspf
        );
    }
    let frame_stats = sample.stats();
    info!(
        "{} frames rendered, {} native, {} shared, {} reused a stale ambient map",
        frame_stats.frames,
        frame_stats.native_frames,
        frame_stats.shared_frames,
        frame_stats.skipped_second_frames
    );

    if let Some(path) = command_args.value_of("output") {
        match sample.read_ambient_map() {
            Ok(ambient_map) => {
                write_pgm(path, &ambient_map).expect("Cannot write ambient map");
                info!("Ambient map written to {}", path);
            }
            Err(err) => warn!("Cannot read the ambient map: {}", err),
        }
    }

    for gpu in [sample.prime(), sample.second()] {
        gpu.info_queue().print_messages();
    }
}
