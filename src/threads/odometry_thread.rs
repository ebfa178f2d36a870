//! Odometry Thread - sweep processing.
//!
//! This thread:
//! - Receives sweeps from a bounded crossbeam channel
//! - Runs each through the odometry engine, strictly in order
//! - Updates the shared snapshot and emits pose, transform and keyframe events
//!
//! It exits when cancelled (checked at least every 10ms) or when every
//! sweep sender has been dropped and the queue is drained.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select};

use crate::core::types::{Pose3D, Sweep, Transform3D};
use crate::engine::odometry::{KeyframeInfo, OdometryEngine, OdometryResult, OdometryStatus};
use crate::state::SharedOdometryHandle;
use crate::utils::CancellationToken;

/// Poll interval for the cancellation check.
const IDLE_TIMEOUT: Duration = Duration::from_millis(10);

/// Output of the odometry thread.
#[derive(Debug, Clone)]
pub enum OdometryEvent {
    /// Corrected pose after a processed sweep.
    Pose {
        timestamp_us: u64,
        pose: Pose3D,
        status: OdometryStatus,
    },
    /// Same pose as a named frame transform for downstream consumers.
    Transform {
        timestamp_us: u64,
        parent_frame: String,
        child_frame: String,
        transform: Transform3D,
    },
    /// A keyframe was created.
    Keyframe(KeyframeInfo),
}

/// Configuration for the odometry thread.
#[derive(Debug, Clone)]
pub struct OdometryThreadConfig {
    /// Fixed reference frame name.
    pub odom_frame: String,
    /// Sensor/body frame name.
    pub child_frame: String,
}

/// Odometry thread handle.
pub struct OdometryThread {
    handle: JoinHandle<()>,
}

impl OdometryThread {
    /// Spawn the odometry thread.
    pub fn spawn(
        config: OdometryThreadConfig,
        engine: OdometryEngine,
        sweeps: Receiver<Sweep>,
        events: Sender<OdometryEvent>,
        shared: SharedOdometryHandle,
        cancel: CancellationToken,
    ) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("odometry".into())
            .spawn(move || run_loop(config, engine, sweeps, events, shared, cancel))?;
        Ok(Self { handle })
    }

    /// Wait for thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run_loop(
    config: OdometryThreadConfig,
    mut engine: OdometryEngine,
    sweeps: Receiver<Sweep>,
    events: Sender<OdometryEvent>,
    shared: SharedOdometryHandle,
    cancel: CancellationToken,
) {
    log::info!("Odometry thread started");

    while !cancel.is_cancelled() {
        select! {
            recv(sweeps) -> msg => match msg {
                Ok(sweep) => {
                    let result = engine.process_sweep(&sweep);
                    shared.write().apply(&result, &engine);
                    publish(&config, &result, &events);
                }
                Err(_) => {
                    log::debug!("Sweep channel closed");
                    break;
                }
            },
            default(IDLE_TIMEOUT) => {}
        }
    }

    log::info!(
        "Odometry thread stopped after {} sweeps, {} keyframes",
        engine.sweeps_processed(),
        engine.keyframes().len()
    );
}

/// Send the events of one result. A full or closed event channel drops them.
fn publish(config: &OdometryThreadConfig, result: &OdometryResult, events: &Sender<OdometryEvent>) {
    if !result.processed {
        return;
    }

    let _ = events.try_send(OdometryEvent::Pose {
        timestamp_us: result.timestamp_us,
        pose: result.pose,
        status: result.status,
    });
    let _ = events.try_send(OdometryEvent::Transform {
        timestamp_us: result.timestamp_us,
        parent_frame: config.odom_frame.clone(),
        child_frame: config.child_frame.clone(),
        transform: result.pose.to_isometry(),
    });
    if let Some(keyframe) = result.keyframe {
        let _ = events.try_send(OdometryEvent::Keyframe(keyframe));
    }
}
