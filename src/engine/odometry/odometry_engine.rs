//! Per-sweep odometry state machine.
//!
//! Combines preprocessing, the inertial prior, both registration stages,
//! keyframe selection, the submap and the ground constraint into one update.

use std::sync::Arc;
use std::time::Instant;

use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::keyframe::{Keyframe, KeyframeConfig, KeyframeManager};
use super::status::{Degradation, KeyframeInfo, OdometryResult, TimingBreakdown};
use super::submap::{SubmapBuilder, SubmapConfig};
use crate::algorithms::adaptive::{AdaptiveConfig, AdaptiveController, spaciousness};
use crate::algorithms::ground::{GroundConfig, GroundConstraint, GroundState};
use crate::algorithms::registration::{
    CovarianceCloud, Gicp, GicpConfig, RegistrationConfig, RegistrationResult,
};
use crate::core::types::{Pose3D, Sweep, Timestamped, Transform3D};
use crate::sensors::imu::{ImuConfig, InertialIntegrator};
use crate::sensors::preprocessing::{
    DetectionBuffer, DynamicMaskConfig, DynamicObjectMask, PreprocessorConfig, SweepPreprocessor,
};

/// Fixed starting pose, replacing identity or gravity alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialPoseConfig {
    pub enabled: bool,

    /// Position (meters)
    pub position: [f32; 3],

    /// Orientation quaternion as `[x, y, z, w]`
    pub orientation: [f32; 4],
}

impl Default for InitialPoseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl InitialPoseConfig {
    /// The configured pose, or `None` when disabled or the quaternion has
    /// no usable norm.
    pub fn pose(&self) -> Option<Pose3D> {
        if !self.enabled {
            return None;
        }
        let [x, y, z, w] = self.orientation;
        let q = UnitQuaternion::try_new(Quaternion::new(w, x, y, z), 1e-6)?;
        Some(Pose3D::new(Vector3::from(self.position), q))
    }
}

/// Everything the engine needs, assembled from the top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct OdometryConfig {
    pub preprocessing: PreprocessorConfig,
    pub detection: DynamicMaskConfig,
    pub imu: ImuConfig,
    pub keyframe: KeyframeConfig,
    pub submap: SubmapConfig,
    pub registration: RegistrationConfig,
    pub adaptive: AdaptiveConfig,
    pub ground: GroundConfig,
    pub initial_pose: InitialPoseConfig,
}

/// Registration target kept from the previous sweep.
struct PreviousSweep {
    cloud: CovarianceCloud,
    timestamp_us: u64,
}

/// Odometry engine.
///
/// Owns keyframes, submap, trajectory and ground state. Inertial samples
/// and detections are shared with producer threads through their own locked
/// buffers; everything else is touched only by the thread calling
/// [`OdometryEngine::process_sweep`].
pub struct OdometryEngine {
    config: OdometryConfig,

    preprocessor: SweepPreprocessor,
    mask: DynamicObjectMask,
    imu: Arc<InertialIntegrator>,
    detections: Arc<DetectionBuffer>,

    s2s: Gicp,
    s2m: Gicp,
    keyframes: KeyframeManager,
    submap: SubmapBuilder,
    adaptive: AdaptiveController,
    ground: GroundConstraint,

    previous: Option<PreviousSweep>,

    /// Pose chained from sweep-to-sweep alignments only.
    s2s_pose: Pose3D,

    /// Corrected pose (after sweep-to-submap and ground).
    pose: Pose3D,

    trajectory: Vec<Timestamped<Pose3D>>,
    sweeps_processed: u64,
}

impl OdometryEngine {
    /// Create an engine reading from shared IMU and detection buffers.
    pub fn new(
        config: OdometryConfig,
        imu: Arc<InertialIntegrator>,
        detections: Arc<DetectionBuffer>,
    ) -> Self {
        let min_points = config.registration.min_points;
        Self {
            preprocessor: SweepPreprocessor::new(&config.preprocessing),
            mask: DynamicObjectMask::new(config.detection),
            imu,
            detections,
            s2s: Gicp::new(config.registration.s2s, min_points),
            s2m: Gicp::new(config.registration.s2m, min_points),
            keyframes: KeyframeManager::new(config.keyframe.clone()),
            submap: SubmapBuilder::new(config.submap.clone()),
            adaptive: AdaptiveController::new(config.adaptive.clone()),
            ground: GroundConstraint::new(config.ground.clone()),
            previous: None,
            s2s_pose: Pose3D::identity(),
            pose: Pose3D::identity(),
            trajectory: Vec::new(),
            sweeps_processed: 0,
            config,
        }
    }

    /// Create an engine with private buffers.
    pub fn standalone(config: OdometryConfig) -> Self {
        let imu = Arc::new(InertialIntegrator::new(config.imu));
        let detections = Arc::new(DetectionBuffer::new(config.detection.buffer_size));
        Self::new(config, imu, detections)
    }

    pub fn config(&self) -> &OdometryConfig {
        &self.config
    }

    /// Shared IMU buffer.
    pub fn imu(&self) -> &Arc<InertialIntegrator> {
        &self.imu
    }

    /// Shared detection buffer.
    pub fn detections(&self) -> &Arc<DetectionBuffer> {
        &self.detections
    }

    /// Current corrected pose.
    pub fn pose(&self) -> Pose3D {
        self.pose
    }

    /// Pose chained from sweep-to-sweep alignments alone.
    pub fn s2s_pose(&self) -> Pose3D {
        self.s2s_pose
    }

    /// Corrected poses of every processed sweep, in order.
    pub fn trajectory(&self) -> &[Timestamped<Pose3D>] {
        &self.trajectory
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        self.keyframes.keyframes()
    }

    /// Number of submap rebuilds so far.
    pub fn submap_rebuilds(&self) -> u64 {
        self.submap.rebuild_count()
    }

    pub fn sweeps_processed(&self) -> u64 {
        self.sweeps_processed
    }

    pub fn ground_state(&self) -> &GroundState {
        self.ground.state()
    }

    /// Registration parameters that the next sweep will use.
    pub fn active_params(&self) -> (GicpConfig, GicpConfig) {
        (*self.s2s.config(), *self.s2m.config())
    }

    /// Whether the first sweep has been accepted.
    pub fn is_initialized(&self) -> bool {
        self.previous.is_some()
    }

    /// Process one sweep.
    ///
    /// Sweeps must arrive in timestamp order.
    pub fn process_sweep(&mut self, sweep: &Sweep) -> OdometryResult {
        let cycle_start = Instant::now();
        let t = sweep.timestamp_us;
        let mut result = OdometryResult::new(t, self.pose);
        let mut timing = TimingBreakdown::default();

        if self.config.imu.enabled && !self.imu.is_calibrated() {
            log::debug!("Sweep at {}us skipped, IMU calibrating", t);
            result.status.raise(Degradation::AwaitingCalibration);
            return result;
        }

        // ==================== Preprocess + mask ====================
        let stage = Instant::now();
        let filtered = self.preprocessor.process(&sweep.data);
        let masked = self.mask.mask_sweep(&filtered, t, &self.detections);
        if !masked.matched_frame {
            log::debug!("No detection frame within tolerance of {}us", t);
            result.status.raise(Degradation::DetectionUnderrun);
        }
        let cloud = masked.cloud;
        result.points = cloud.len();
        timing.preprocess_us = elapsed_us(stage);

        if cloud.len() < self.config.registration.min_points {
            log::warn!(
                "Sweep at {}us has {} points (need {}), holding pose",
                t,
                cloud.len(),
                self.config.registration.min_points
            );
            result.status.raise(Degradation::InsufficientData);
            if self.previous.is_some() {
                self.commit(t, &mut result);
            }
            timing.total_us = elapsed_us(cycle_start);
            result.timing = timing;
            return result;
        }

        // ==================== Covariances ====================
        let stage = Instant::now();
        let s2s_k = self.config.registration.s2s.k_correspondences;
        let s2m_k = self.config.registration.s2m.k_correspondences;
        let current = CovarianceCloud::from_points(cloud.points, s2s_k);
        let current_s2m = (s2m_k != s2s_k)
            .then(|| CovarianceCloud::from_points(current.points().to_vec(), s2m_k));
        timing.covariance_us = elapsed_us(stage);

        let Some(previous) = self.previous.take() else {
            self.initialize(t, current, current_s2m, &mut result);
            timing.total_us = elapsed_us(cycle_start);
            result.timing = timing;
            return result;
        };

        // ==================== Inertial prior ====================
        let prior = if self.config.imu.enabled {
            let prior = self.imu.predict_delta(previous.timestamp_us, t);
            if prior.is_underrun() {
                log::debug!(
                    "No IMU samples in ({}, {}]us, identity prior",
                    previous.timestamp_us,
                    t
                );
                result.status.raise(Degradation::ImuUnderrun);
            }
            prior.delta
        } else {
            UnitQuaternion::identity()
        };
        let guess = Transform3D::from_parts(Vector3::zeros().into(), prior);

        // ==================== Sweep-to-sweep ====================
        let stage = Instant::now();
        let relative = match self.s2s.align(&current, &previous.cloud, &guess) {
            Ok(r) => {
                note_convergence("sweep-to-sweep", t, &r, &mut result);
                result.s2s_fitness = Some(r.fitness);
                r.transform
            }
            Err(e) => {
                log::warn!("Sweep-to-sweep skipped: {}", e);
                result.status.raise(Degradation::InsufficientData);
                guess
            }
        };
        timing.s2s_us = elapsed_us(stage);

        self.s2s_pose = Pose3D::from_isometry(&(self.s2s_pose.to_isometry() * relative));
        let predicted = self.pose.to_isometry() * relative;

        // ==================== Submap ====================
        let stage = Instant::now();
        let query = Point3::from(predicted.translation.vector);
        result.submap_rebuilt = self
            .submap
            .update(self.keyframes.keyframes(), &query, s2m_k);
        timing.submap_us = elapsed_us(stage);

        // ==================== Sweep-to-submap ====================
        let stage = Instant::now();
        let source = current_s2m.as_ref().unwrap_or(&current);
        let registered = match self.submap.submap() {
            Some(submap) => match self.s2m.align(source, &submap.cloud, &predicted) {
                Ok(r) => {
                    note_convergence("sweep-to-submap", t, &r, &mut result);
                    result.s2m_fitness = Some(r.fitness);
                    r.transform
                }
                Err(e) => {
                    log::warn!("Sweep-to-submap skipped: {}", e);
                    result.status.raise(Degradation::InsufficientData);
                    predicted
                }
            },
            None => {
                result.status.raise(Degradation::EmptySubmap);
                predicted
            }
        };
        timing.s2m_us = elapsed_us(stage);

        // ==================== Ground ====================
        let stage = Instant::now();
        let registered = Pose3D::from_isometry(&registered);
        self.pose = if self.config.ground.enabled {
            self.ground.correct(&current.to_point_cloud(), &registered)
        } else {
            registered
        };
        timing.ground_us = elapsed_us(stage);

        // ==================== Commit ====================
        self.commit(t, &mut result);
        let pose = self.pose;
        let keyframe = self.keyframes.evaluate(&pose, t, || match &current_s2m {
            Some(c) => c.clone(),
            None => current.clone(),
        });
        result.keyframe = keyframe.map(keyframe_info);

        self.adapt(&current);
        self.previous = Some(PreviousSweep {
            cloud: current,
            timestamp_us: t,
        });

        timing.total_us = elapsed_us(cycle_start);
        result.timing = timing;
        log::debug!(
            "Sweep {}: [{:.3}, {:.3}, {:.3}] {} in {}us",
            self.sweeps_processed,
            self.pose.position.x,
            self.pose.position.y,
            self.pose.position.z,
            result.status,
            timing.total_us
        );
        result
    }

    /// First accepted sweep: anchor the trajectory and create keyframe 0.
    fn initialize(
        &mut self,
        t: u64,
        current: CovarianceCloud,
        current_s2m: Option<CovarianceCloud>,
        result: &mut OdometryResult,
    ) {
        let initial = self
            .config
            .initial_pose
            .pose()
            .or_else(|| {
                if self.config.imu.enabled {
                    self.imu
                        .gravity_alignment()
                        .map(|q| Pose3D::new(Vector3::zeros(), q))
                } else {
                    None
                }
            })
            .unwrap_or_else(Pose3D::identity);

        log::info!(
            "Odometry initialised at [{:.3}, {:.3}, {:.3}] with {} points",
            initial.position.x,
            initial.position.y,
            initial.position.z,
            current.len()
        );

        self.pose = initial;
        self.s2s_pose = initial;
        result.status.raise(Degradation::EmptySubmap);
        self.commit(t, result);

        let stored = current_s2m.unwrap_or_else(|| current.clone());
        let keyframe = self.keyframes.insert(initial, stored, t);
        result.keyframe = Some(keyframe_info(keyframe));

        self.adapt(&current);
        self.previous = Some(PreviousSweep {
            cloud: current,
            timestamp_us: t,
        });
    }

    fn commit(&mut self, t: u64, result: &mut OdometryResult) {
        self.trajectory.push(Timestamped::new(self.pose, t));
        self.sweeps_processed += 1;
        result.pose = self.pose;
        result.processed = true;
    }

    /// Feed the scene metric and set next-cycle registration parameters.
    fn adapt(&mut self, current: &CovarianceCloud) {
        if !self.config.adaptive.enabled {
            return;
        }
        if let Some(s) = spaciousness(current) {
            self.adaptive.record(s);
        }
        let (s2s, s2m) = self
            .adaptive
            .next_params(&self.config.registration.s2s, &self.config.registration.s2m);
        if s2s != *self.s2s.config() {
            log::trace!(
                "Adaptive: s2s gate {:.2}m / {} iters, s2m gate {:.2}m / {} iters",
                s2s.max_correspondence_distance,
                s2s.max_iterations,
                s2m.max_correspondence_distance,
                s2m.max_iterations
            );
        }
        self.s2s.set_config(s2s);
        self.s2m.set_config(s2m);
    }
}

fn note_convergence(stage: &str, t: u64, r: &RegistrationResult, result: &mut OdometryResult) {
    if !r.converged {
        log::warn!(
            "{} did not converge at {}us ({} iterations, fitness {:.4})",
            stage,
            t,
            r.iterations,
            r.fitness
        );
        result.status.raise(Degradation::NonConvergence);
    }
}

fn keyframe_info(keyframe: &Keyframe) -> KeyframeInfo {
    KeyframeInfo {
        id: keyframe.id,
        timestamp_us: keyframe.timestamp_us,
        pose: keyframe.pose,
        points: keyframe.cloud.len(),
    }
}

#[inline]
fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PointCloud3D;
    use approx::assert_relative_eq;

    fn sparse_sweep(t: u64) -> Sweep {
        Sweep::new(
            PointCloud3D::from_points(vec![Point3::new(3.0, 0.0, 0.0); 20]),
            t,
        )
    }

    #[test]
    fn test_initial_pose_config() {
        let mut config = InitialPoseConfig::default();
        assert!(config.pose().is_none());

        config.enabled = true;
        config.position = [1.0, 2.0, 3.0];
        config.orientation = [0.0, 0.0, 2.0, 0.0];
        let pose = config.pose().unwrap();
        assert_relative_eq!(pose.position.y, 2.0);
        assert_relative_eq!(pose.orientation.angle(), std::f32::consts::PI, epsilon = 1e-5);

        config.orientation = [0.0; 4];
        assert!(config.pose().is_none());
    }

    #[test]
    fn test_skips_until_imu_calibrated() {
        let mut engine = OdometryEngine::standalone(OdometryConfig::default());

        let result = engine.process_sweep(&sparse_sweep(1_000));

        assert!(!result.processed);
        assert!(result.status.contains(Degradation::AwaitingCalibration));
        assert_eq!(engine.sweeps_processed(), 0);
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_sparse_first_sweep_not_committed() {
        let mut config = OdometryConfig::default();
        config.imu.enabled = false;
        let mut engine = OdometryEngine::standalone(config);

        let result = engine.process_sweep(&sparse_sweep(1_000));

        assert!(!result.processed);
        assert!(result.status.contains(Degradation::InsufficientData));
        assert!(engine.trajectory().is_empty());
        assert!(engine.keyframes().is_empty());
    }

    #[test]
    fn test_disabled_adaptive_keeps_base_params() {
        let mut config = OdometryConfig::default();
        config.imu.enabled = false;
        config.adaptive.enabled = false;
        let engine = OdometryEngine::standalone(config.clone());

        let (s2s, s2m) = engine.active_params();
        assert_eq!(s2s, config.registration.s2s);
        assert_eq!(s2m, config.registration.s2m);
    }
}
