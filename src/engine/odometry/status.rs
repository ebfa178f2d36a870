//! Per-sweep quality reporting.

use std::fmt;

use crate::core::types::Pose3D;

/// Recoverable conditions that lowered the quality of one update.
///
/// None of these stop the odometry; they describe which fallback was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degradation {
    /// Sweep had fewer points than the registration minimum; pose held.
    InsufficientData,
    /// A registration stage hit its iteration budget; best estimate used.
    NonConvergence,
    /// No submap available; sweep-to-sweep pose promoted.
    EmptySubmap,
    /// No inertial samples covered the sweep interval; identity prior used.
    ImuUnderrun,
    /// No detection frame near the sweep time; sweep left unmasked.
    DetectionUnderrun,
    /// IMU bias calibration still running; sweep skipped.
    AwaitingCalibration,
}

impl Degradation {
    const ALL: [Degradation; 6] = [
        Degradation::InsufficientData,
        Degradation::NonConvergence,
        Degradation::EmptySubmap,
        Degradation::ImuUnderrun,
        Degradation::DetectionUnderrun,
        Degradation::AwaitingCalibration,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Degradation::InsufficientData => "insufficient-data",
            Degradation::NonConvergence => "non-convergence",
            Degradation::EmptySubmap => "empty-submap",
            Degradation::ImuUnderrun => "imu-underrun",
            Degradation::DetectionUnderrun => "detection-underrun",
            Degradation::AwaitingCalibration => "awaiting-calibration",
        };
        f.write_str(name)
    }
}

/// Set of degradations raised while processing one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OdometryStatus {
    bits: u8,
}

impl OdometryStatus {
    /// No degradation.
    pub fn nominal() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, flag: Degradation) {
        self.bits |= flag.bit();
    }

    pub fn contains(&self, flag: Degradation) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn is_nominal(&self) -> bool {
        self.bits == 0
    }

    /// Raised flags in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Degradation> + '_ {
        Degradation::ALL
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

impl fmt::Display for OdometryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nominal() {
            return f.write_str("nominal");
        }
        let names: Vec<String> = self.iter().map(|d| d.to_string()).collect();
        f.write_str(&names.join(","))
    }
}

/// Wall-clock time spent in each stage of one update (microseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingBreakdown {
    /// Filtering and masking
    pub preprocess_us: u64,
    /// Covariance estimation of the current sweep
    pub covariance_us: u64,
    /// Sweep-to-sweep registration
    pub s2s_us: u64,
    /// Keyframe selection and submap assembly
    pub submap_us: u64,
    /// Sweep-to-submap registration
    pub s2m_us: u64,
    /// Ground constraint
    pub ground_us: u64,
    /// Whole update
    pub total_us: u64,
}

/// Summary of a newly created keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframeInfo {
    pub id: u64,
    pub timestamp_us: u64,
    pub pose: Pose3D,
    pub points: usize,
}

/// Output of processing one sweep.
#[derive(Debug, Clone)]
pub struct OdometryResult {
    /// Sweep timestamp (microseconds).
    pub timestamp_us: u64,

    /// Corrected pose after this sweep.
    pub pose: Pose3D,

    /// False when the sweep was skipped (awaiting calibration, or too few
    /// points before initialisation) and nothing was appended to the trajectory.
    pub processed: bool,

    /// Raised degradations.
    pub status: OdometryStatus,

    /// Keyframe created by this sweep.
    pub keyframe: Option<KeyframeInfo>,

    /// Whether the submap was rebuilt this cycle.
    pub submap_rebuilt: bool,

    /// Fitness of the sweep-to-sweep alignment (m²).
    pub s2s_fitness: Option<f32>,

    /// Fitness of the sweep-to-submap alignment (m²).
    pub s2m_fitness: Option<f32>,

    /// Points left after preprocessing and masking.
    pub points: usize,

    pub timing: TimingBreakdown,
}

impl OdometryResult {
    pub(crate) fn new(timestamp_us: u64, pose: Pose3D) -> Self {
        Self {
            timestamp_us,
            pose,
            processed: false,
            status: OdometryStatus::nominal(),
            keyframe: None,
            submap_rebuilt: false,
            s2s_fitness: None,
            s2m_fitness: None,
            points: 0,
            timing: TimingBreakdown::default(),
        }
    }
}
