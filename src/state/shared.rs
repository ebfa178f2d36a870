//! Thread-safe odometry snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::algorithms::registration::GicpConfig;
use crate::core::types::{Pose3D, Timestamped};
use crate::engine::odometry::{OdometryEngine, OdometryResult, OdometryStatus, TimingBreakdown};

/// Consistent view of the odometry after the latest sweep.
#[derive(Debug, Clone, Default)]
pub struct OdometrySnapshot {
    /// Timestamp of the latest sweep seen (microseconds).
    pub timestamp_us: u64,
    /// Corrected pose.
    pub pose: Pose3D,
    /// Pose from sweep-to-sweep alignment alone.
    pub s2s_pose: Pose3D,
    /// Degradations of the latest sweep.
    pub status: OdometryStatus,
    /// Sweeps appended to the trajectory.
    pub sweeps_processed: u64,
    /// Sweeps dropped because the input queue was full.
    pub sweeps_dropped: u64,
    pub keyframe_count: usize,
    pub submap_rebuilds: u64,
    /// Registration parameters for the next sweep (s2s, s2m).
    pub params: Option<(GicpConfig, GicpConfig)>,
    pub timing: TimingBreakdown,
    /// Corrected pose of every processed sweep.
    pub trajectory: Vec<Timestamped<Pose3D>>,
}

impl OdometrySnapshot {
    /// Fold one engine update into the snapshot.
    pub fn apply(&mut self, result: &OdometryResult, engine: &OdometryEngine) {
        self.timestamp_us = result.timestamp_us;
        self.status = result.status;
        self.timing = result.timing;
        if !result.processed {
            return;
        }
        self.pose = result.pose;
        self.s2s_pose = engine.s2s_pose();
        self.sweeps_processed = engine.sweeps_processed();
        self.keyframe_count = engine.keyframes().len();
        self.submap_rebuilds = engine.submap_rebuilds();
        self.params = Some(engine.active_params());
        self.trajectory
            .push(Timestamped::new(result.pose, result.timestamp_us));
    }
}

/// Single-writer / multi-reader handle to the snapshot.
pub type SharedOdometryHandle = Arc<RwLock<OdometrySnapshot>>;

/// Create an empty shared snapshot.
pub fn create_shared_odometry() -> SharedOdometryHandle {
    Arc::new(RwLock::new(OdometrySnapshot::default()))
}
