//! Odometry node: the delivery surface of the core.
//!
//! The node owns the inertial and detection buffers, the odometry worker
//! thread and its cancellation token. Producers call the `push_*` /
//! `submit_*` methods from any thread:
//!
//! ```text
//!   push_imu ───────────▶ InertialIntegrator (locked buffer)
//!   push_detections ────▶ DetectionBuffer    (locked buffer)
//!   submit_sweep ──[bounded channel]──▶ OdometryThread ──▶ events()
//!                                            │
//!                                            ▼
//!                                     OdometrySnapshot (RwLock)
//! ```
//!
//! Sweeps are processed one at a time in arrival order. When the sweep queue
//! is full, [`OdometryNode::submit_sweep`] drops the sweep and counts it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::config::GatiConfig;
use crate::core::types::{DetectionFrame, ImuSample, Pose3D, Sweep};
use crate::engine::odometry::OdometryEngine;
use crate::error::{GatiError, Result};
use crate::io::write_tum;
use crate::sensors::imu::InertialIntegrator;
use crate::sensors::preprocessing::DetectionBuffer;
use crate::state::{OdometrySnapshot, SharedOdometryHandle, create_shared_odometry};
use crate::threads::{OdometryEvent, OdometryThread, OdometryThreadConfig};
use crate::utils::CancellationToken;

/// Running odometry core.
pub struct OdometryNode {
    imu: Arc<InertialIntegrator>,
    detections: Arc<DetectionBuffer>,
    sweep_tx: Option<Sender<Sweep>>,
    events_rx: Receiver<OdometryEvent>,
    shared: SharedOdometryHandle,
    cancel: CancellationToken,
    thread: Option<OdometryThread>,
    dropped: AtomicU64,
}

impl OdometryNode {
    /// Validate the configuration and start the worker thread.
    pub fn new(config: &GatiConfig) -> Result<Self> {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Start with an externally owned cancellation token (e.g. wired to Ctrl-C).
    pub fn with_cancellation(config: &GatiConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;

        let imu = Arc::new(InertialIntegrator::new(config.imu));
        let detections = Arc::new(DetectionBuffer::new(config.detection.buffer_size));
        let engine = OdometryEngine::new(config.odometry(), Arc::clone(&imu), Arc::clone(&detections));

        let (sweep_tx, sweep_rx) = bounded(config.threads.sweep_queue);
        let (events_tx, events_rx) = bounded(config.threads.event_queue);
        let shared = create_shared_odometry();

        let thread = OdometryThread::spawn(
            OdometryThreadConfig {
                odom_frame: config.frames.odom_frame.clone(),
                child_frame: config.frames.child_frame.clone(),
            },
            engine,
            sweep_rx,
            events_tx,
            Arc::clone(&shared),
            cancel.clone(),
        )?;

        log::info!(
            "Odometry node started (imu {}, ground {}, adaptive {}, sweep queue {})",
            if config.imu.enabled { "on" } else { "off" },
            if config.ground.enabled { "on" } else { "off" },
            if config.adaptive.enabled { "on" } else { "off" },
            config.threads.sweep_queue
        );

        Ok(Self {
            imu,
            detections,
            sweep_tx: Some(sweep_tx),
            events_rx,
            shared,
            cancel,
            thread: Some(thread),
            dropped: AtomicU64::new(0),
        })
    }

    /// Deliver a sweep without blocking.
    ///
    /// Returns `false` if the sweep was dropped because the queue is full or
    /// the worker has stopped.
    pub fn submit_sweep(&self, sweep: Sweep) -> bool {
        let Some(tx) = &self.sweep_tx else {
            return false;
        };
        match tx.try_send(sweep) {
            Ok(()) => true,
            Err(TrySendError::Full(sweep)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                self.shared.write().sweeps_dropped = dropped;
                log::debug!("Sweep queue full, dropped sweep at {}us", sweep.timestamp_us);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Deliver a sweep, waiting for queue space. Used for offline replay.
    pub fn submit_sweep_blocking(&self, sweep: Sweep) -> bool {
        self.sweep_tx
            .as_ref()
            .is_some_and(|tx| tx.send(sweep).is_ok())
    }

    /// Deliver one inertial sample.
    pub fn push_imu(&self, sample: ImuSample) {
        self.imu.push(sample);
    }

    /// Deliver one detection frame.
    pub fn push_detections(&self, frame: DetectionFrame) {
        self.detections.push(frame);
    }

    /// Copy of the latest odometry state.
    pub fn snapshot(&self) -> OdometrySnapshot {
        self.shared.read().clone()
    }

    /// Latest corrected pose.
    pub fn pose(&self) -> Pose3D {
        self.shared.read().pose
    }

    /// Shared snapshot handle for reader threads.
    pub fn shared(&self) -> SharedOdometryHandle {
        Arc::clone(&self.shared)
    }

    /// Output events (pose, transform, keyframe).
    pub fn events(&self) -> &Receiver<OdometryEvent> {
        &self.events_rx
    }

    /// Sweeps dropped at submission.
    pub fn sweeps_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Export the trajectory so far in TUM format.
    pub fn save_trajectory(&self, path: &Path) -> Result<usize> {
        let trajectory = self.shared.read().trajectory.clone();
        Ok(write_tum(path, &trajectory)?)
    }

    /// Close the sweep input, let the worker drain the queue and return the
    /// final state.
    pub fn finish(mut self) -> Result<OdometrySnapshot> {
        self.sweep_tx = None;
        self.join()?;
        Ok(self.snapshot())
    }

    /// Stop the worker without draining queued sweeps.
    pub fn shutdown(mut self) -> Result<OdometrySnapshot> {
        self.cancel.cancel();
        self.sweep_tx = None;
        self.join()?;
        Ok(self.snapshot())
    }

    fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| GatiError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for OdometryNode {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel.cancel();
            self.sweep_tx = None;
            if self.join().is_err() {
                log::error!("Odometry thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PointCloud3D;
    use nalgebra::Point3;

    fn disabled_imu_config() -> GatiConfig {
        let mut config = GatiConfig::default();
        config.imu.enabled = false;
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = disabled_imu_config();
        config.threads.sweep_queue = 0;
        assert!(matches!(
            OdometryNode::new(&config),
            Err(GatiError::Config(_))
        ));
    }

    #[test]
    fn test_sparse_sweep_not_in_trajectory() {
        let node = OdometryNode::new(&disabled_imu_config()).unwrap();
        let cloud = PointCloud3D::from_points(vec![Point3::new(2.0, 0.0, 0.0); 5]);
        assert!(node.submit_sweep_blocking(Sweep::new(cloud, 1_000)));

        let snapshot = node.finish().unwrap();
        assert_eq!(snapshot.timestamp_us, 1_000);
        assert!(snapshot.trajectory.is_empty());
        assert_eq!(snapshot.sweeps_dropped, 0);
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let node = OdometryNode::new(&disabled_imu_config()).unwrap();
        let snapshot = node.shutdown().unwrap();
        assert!(snapshot.trajectory.is_empty());
    }
}
