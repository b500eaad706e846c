//! Headless grass field simulation.
//!
//! Usage: cargo run --release --bin simulate_field -- [OPTIONS]
//!
//! Options:
//!   --size <METERS>     Field edge length in meters (default: 40)
//!   --density <N>       Blades per square meter (default: 60)
//!   --seed <SEED>       Random seed (default: 12345)
//!   --frames <N>        Frames to simulate (default: 300)
//!   --config <PATH>     Grass config JSON (default: built-in defaults)
//!   --wind <KIND>       directional | point | tangential (default: directional)
//!
//! A camera orbits the field while a sphere rolls through the grass.

use std::path::PathBuf;

use glam::{UVec2, Vec2, Vec3};

use tussock::core::camera::Camera;
use tussock::core::time::FrameTimer;
use tussock::core::logging;
use tussock::grass::{
    BladeFieldBuilder, FrameInputs, GrassConfig, GrassSystem, HeightMap, HeightMapBounds, HeightSampler,
    WindKind,
};
use tussock::math::Sphere;

const DT: f32 = 1.0 / 60.0;

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let size = parse_f32_arg(&args, "--size").unwrap_or(40.0);
    let density = parse_f32_arg(&args, "--density").unwrap_or(60.0);
    let seed = parse_u64_arg(&args, "--seed").unwrap_or(12345);
    let frames = parse_usize_arg(&args, "--frames").unwrap_or(300);
    let config_path = parse_str_arg(&args, "--config").map(PathBuf::from);
    let wind = match parse_str_arg(&args, "--wind").as_deref() {
        Some("point") => WindKind::Point,
        Some("tangential") => WindKind::PointWithTangential,
        _ => WindKind::Directional,
    };

    if let Err(e) = run(size, density, seed, frames, config_path, wind) {
        log::error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run(
    size: f32,
    density: f32,
    seed: u64,
    frames: usize,
    config_path: Option<PathBuf>,
    wind: WindKind,
) -> tussock::core::Result<()> {
    let config = match &config_path {
        Some(path) => {
            log::info!("Loading grass config from {}", path.display());
            GrassConfig::load(path)?
        }
        None => GrassConfig::default(),
    };

    let half = size * 0.5;
    let blades = BladeFieldBuilder::new(seed)
        .with_density(density)
        .rectangle(Vec2::splat(-half), Vec2::splat(half), 0.0);
    log::info!("Generated {} blades over {}m x {}m", blades.len(), size, size);

    let mut system = GrassSystem::from_field(config, blades)?;
    system.wind_mut().set_kind(wind);
    log::info!(
        "{} patches, pressure map {:?}",
        system.patches().len(),
        system.pressure_map().dimensions()
    );

    let ground = HeightMap::flat(0.0, 0.0);
    let bounds = HeightMapBounds::new(Vec2::splat(-half), Vec2::splat(size));
    let viewport = UVec2::new(1280, 720);
    let mut visible_total = 0u64;
    let mut timer = FrameTimer::new();

    for frame in 0..frames {
        let t = frame as f32 * DT;

        let orbit = Vec3::new((t * 0.2).cos(), 0.0, (t * 0.2).sin()) * half * 0.8;
        let camera = Camera::look_at(orbit + Vec3::Y * 6.0, Vec3::ZERO, Vec3::Y);
        let view = camera.frame_view(viewport);

        let ball = Sphere::new(Vec3::new((t * 0.5).sin() * half * 0.5, 0.4, 0.0), 0.5);
        let colliders = [ball];
        let inputs = FrameInputs {
            colliders: &colliders,
            height_field: Some(HeightSampler::new(&ground, bounds)),
            ..FrameInputs::default()
        };

        let stats = system.update(DT, &view, &inputs)?;
        timer.tick();
        visible_total += stats.visible_blades as u64;

        if frame % 60 == 0 {
            log::info!(
                "Frame {}: {}/{} patches animated, {} visible, {}/{} blades drawn ({:.2} ms stages, {:.2} ms frame)",
                timer.frame_count(),
                stats.force_patches,
                stats.patches,
                stats.visible_patches,
                stats.visible_blades,
                stats.total_blades,
                stats.timings.total_ms(),
                timer.delta_secs() * 1000.0
            );
        }
    }

    let avg = system.timings().average();
    log::info!(
        "Average over {} frames: force {:.3} ms, visibility {:.3} ms, finalize {:.3} ms",
        system.timings().frames_recorded(),
        avg.force_ms,
        avg.visibility_ms,
        avg.finalize_ms
    );
    if frames > 0 {
        log::info!("Average visible blades: {}", visible_total / frames as u64);
    }
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
