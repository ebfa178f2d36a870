//! Gati - recording replay
//!
//! Replays a line-based sensor recording through the odometry node and
//! exports the trajectory in TUM format.
//!
//! # Usage
//!
//! ```bash
//! # Replay as fast as possible with configs/gati.toml (or defaults)
//! cargo run --release -- run01/recording.txt
//!
//! # Custom config, output path, paced by recording timestamps
//! cargo run --release -- run01/recording.txt --config gati.toml \
//!     --output run01/trajectory.txt --realtime
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use gati::io::{RecordEvent, RecordingReader};
use gati::utils::{CancellationToken, install_ctrlc};
use gati::{GatiConfig, GatiError, OdometryEvent, OdometryNode};

#[derive(Parser, Debug)]
#[command(name = "gati")]
#[command(about = "Replay a sensor recording through the LiDAR-inertial odometry")]
struct Args {
    /// Recording file (imu / sweep / box lines)
    recording: PathBuf,

    /// Configuration file (defaults to configs/gati.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output trajectory in TUM format
    #[arg(short, long, default_value = "trajectory.txt")]
    output: PathBuf,

    /// Pace playback by recording timestamps; late sweeps are dropped
    #[arg(long)]
    realtime: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), GatiError> {
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            GatiConfig::load(path)?
        }
        None => GatiConfig::load_default()?,
    };

    let cancel = CancellationToken::new();
    if let Err(e) = install_ctrlc(cancel.clone()) {
        log::warn!("Ctrl-C handler not installed: {}", e);
    }

    let node = OdometryNode::with_cancellation(&config, cancel.clone())?;
    let reader = RecordingReader::open(&args.recording)?;

    let start = Instant::now();
    let mut first_timestamp_us = None;
    let mut sweeps = 0usize;

    for event in reader {
        if cancel.is_cancelled() {
            log::info!("Replay interrupted");
            break;
        }
        let event = event?;

        if args.realtime {
            let t0 = *first_timestamp_us.get_or_insert(event.timestamp_us());
            let due = Duration::from_micros(event.timestamp_us().saturating_sub(t0));
            if let Some(wait) = due.checked_sub(start.elapsed()) {
                thread::sleep(wait);
            }
        }

        match event {
            RecordEvent::Imu(sample) => node.push_imu(sample),
            RecordEvent::Detections(frame) => node.push_detections(frame),
            RecordEvent::Sweep(sweep) => {
                sweeps += 1;
                if args.realtime {
                    node.submit_sweep(sweep);
                } else {
                    node.submit_sweep_blocking(sweep);
                }
            }
        }
        drain_events(&node);
    }

    let snapshot = node.finish()?;

    log::info!(
        "Replayed {} sweeps in {:.1}s: {} poses, {} keyframes, {} dropped",
        sweeps,
        start.elapsed().as_secs_f32(),
        snapshot.trajectory.len(),
        snapshot.keyframe_count,
        snapshot.sweeps_dropped
    );

    let written = gati::io::write_tum(&args.output, &snapshot.trajectory)?;
    log::info!("Wrote {} poses to {}", written, args.output.display());
    Ok(())
}

/// Log keyframe events; pose and transform events have no consumer here.
fn drain_events(node: &OdometryNode) {
    for event in node.events().try_iter() {
        if let OdometryEvent::Keyframe(info) = event {
            log::debug!(
                "Keyframe {} at ({:.2}, {:.2}, {:.2}), {} points",
                info.id,
                info.pose.position.x,
                info.pose.position.y,
                info.pose.position.z,
                info.points
            );
        }
    }
}
