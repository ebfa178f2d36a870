//! Ground plane constraint.
//!
//! Scan registration leaves height, roll and pitch weakly observed on long
//! flat runs. Near-sensor ground points are fitted with a plane every sweep,
//! seeded from the lowest candidates so the bottom rows of nearby walls do
//! not lift the fit;
//! the deviation of that plane from the level reference seen on the first
//! fit is low-passed into a persistent correction and applied to the
//! registered pose.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::types::{PointCloud3D, Pose3D};

/// Ground constraint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    pub enabled: bool,

    /// Candidate points lie below this sensor-frame height (meters).
    pub threshold: f32,

    /// Candidate points lie within this horizontal range of the sensor (meters).
    pub radius: f32,

    /// Lowest candidates averaged into the seed height.
    pub seed_points: usize,

    /// Candidates within this height above the seed height seed the first fit (meters).
    pub seed_band: f32,

    /// Points farther than this from the first plane are dropped before the refit (meters).
    pub inlier_distance: f32,

    /// Smallest accepted |normal.z| of the fitted plane (cosine of the max tilt).
    pub min_upright: f32,

    /// Fewest inliers for a usable fit.
    pub min_points: usize,

    /// Low-pass gain in (0, 1]. 1 applies each measurement in full.
    pub gain: f32,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: -0.3,
            radius: 10.0,
            seed_points: 20,
            seed_band: 0.1,
            inlier_distance: 0.1,
            min_upright: 0.85,
            min_points: 50,
            gain: 0.2,
        }
    }
}

/// Plane fitted in the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlane {
    /// Unit normal, oriented towards the sensor
    pub normal: Vector3<f32>,
    /// Centroid of the inliers
    pub centroid: Point3<f32>,
    /// Distance from the sensor origin to the plane
    pub sensor_height: f32,
    /// Points used in the final fit
    pub inliers: usize,
}

/// Near-ground candidates of a sensor-frame sweep.
pub fn ground_candidates(cloud: &PointCloud3D, config: &GroundConfig) -> Vec<Point3<f32>> {
    let radius_sq = config.radius * config.radius;
    cloud
        .iter()
        .filter(|p| p.z < config.threshold && p.x * p.x + p.y * p.y < radius_sq)
        .copied()
        .collect()
}

/// Smallest in-plane variance a plane fit needs (m²). Collinear points do
/// not define a normal.
const MIN_PLANE_SPREAD: f32 = 1e-4;

/// Total least squares plane through the lowest points, refitted once on
/// inliers.
///
/// The first fit only uses candidates within `seed_band` of the mean height
/// of the `seed_points` lowest ones. The refit takes every candidate within
/// `inlier_distance` of that plane. Planes tilted beyond `min_upright` are
/// rejected.
pub fn fit_ground_plane(points: &[Point3<f32>], config: &GroundConfig) -> Option<GroundPlane> {
    let min_points = config.min_points.max(3);
    if points.len() < min_points {
        return None;
    }

    let mut heights: Vec<f32> = points.iter().map(|p| p.z).collect();
    let lowest = config.seed_points.clamp(1, heights.len());
    heights.select_nth_unstable_by(lowest - 1, f32::total_cmp);
    let seed_height = heights[..lowest].iter().sum::<f32>() / lowest as f32;

    let seeds: Vec<Point3<f32>> = points
        .iter()
        .filter(|p| p.z < seed_height + config.seed_band)
        .copied()
        .collect();
    let (normal, centroid) = fit_plane(&seeds)?;

    let inliers: Vec<Point3<f32>> = points
        .iter()
        .filter(|p| normal.dot(&(*p - centroid)).abs() <= config.inlier_distance)
        .copied()
        .collect();
    if inliers.len() < min_points {
        return None;
    }

    let (mut normal, centroid) = fit_plane(&inliers)?;
    if normal.z.abs() < config.min_upright {
        log::debug!("Ground: rejected plane with normal z {:.3}", normal.z);
        return None;
    }
    // Sensor origin on the positive side
    if normal.dot(&centroid.coords) > 0.0 {
        normal = -normal;
    }

    Some(GroundPlane {
        normal,
        centroid,
        sensor_height: -normal.dot(&centroid.coords),
        inliers: inliers.len(),
    })
}

fn fit_plane(points: &[Point3<f32>]) -> Option<(Vector3<f32>, Point3<f32>)> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f32;
    let centroid = Point3::from(points.iter().map(|p| p.coords).sum::<Vector3<f32>>() / n);
    let mut scatter = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        scatter += d * d.transpose();
    }

    let eig = (scatter / n).symmetric_eigen();
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    if eig.eigenvalues[order[1]] < MIN_PLANE_SPREAD {
        return None;
    }

    let normal = eig.eigenvectors.column(order[0]).into_owned();
    let norm = normal.norm();
    (norm > 1e-6).then(|| (normal / norm, centroid))
}

/// Persistent ground estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundState {
    /// Ground height in the world on the first fit
    pub reference_height: Option<f32>,
    /// Latest measured world-frame normal
    pub normal: Vector3<f32>,
    /// Height correction added to the pose (meters)
    pub height_offset: f32,
    /// Rotation correction pre-multiplied onto the pose orientation
    pub rotation: UnitQuaternion<f32>,
}

impl Default for GroundState {
    fn default() -> Self {
        Self {
            reference_height: None,
            normal: Vector3::z(),
            height_offset: 0.0,
            rotation: UnitQuaternion::identity(),
        }
    }
}

/// Filters ground fits over time and corrects poses with them.
#[derive(Debug, Clone)]
pub struct GroundConstraint {
    config: GroundConfig,
    state: GroundState,
}

impl GroundConstraint {
    pub fn new(config: GroundConfig) -> Self {
        Self {
            config,
            state: GroundState::default(),
        }
    }

    pub fn config(&self) -> &GroundConfig {
        &self.config
    }

    pub fn state(&self) -> &GroundState {
        &self.state
    }

    /// Update the estimate from a sensor-frame sweep registered at `pose` and
    /// return the corrected pose.
    ///
    /// Without a usable fit the previous correction is applied unchanged.
    pub fn correct(&mut self, cloud: &PointCloud3D, pose: &Pose3D) -> Pose3D {
        if !self.config.enabled {
            return *pose;
        }

        let candidates = ground_candidates(cloud, &self.config);
        match fit_ground_plane(&candidates, &self.config) {
            Some(plane) => self.update(&plane, pose),
            None => log::debug!(
                "Ground: no plane fit ({} candidates, need {})",
                candidates.len(),
                self.config.min_points
            ),
        }

        self.apply(pose)
    }

    fn update(&mut self, plane: &GroundPlane, pose: &Pose3D) {
        let world_normal = pose.orientation * plane.normal;
        let height = pose.position.z - plane.sensor_height;
        self.state.normal = world_normal;

        let Some(reference) = self.state.reference_height else {
            self.state.reference_height = Some(height);
            log::info!("Ground: reference height {:.3}m", height);
            return;
        };

        let gain = self.config.gain;
        let height_error = reference - height;
        let tilt_error = UnitQuaternion::rotation_between(&world_normal, &Vector3::z())
            .unwrap_or_else(UnitQuaternion::identity);

        self.state.height_offset += gain * (height_error - self.state.height_offset);
        self.state.rotation = self
            .state
            .rotation
            .try_slerp(&tilt_error, gain, 1e-6)
            .unwrap_or(tilt_error);

        log::trace!(
            "Ground: height error {:.3}m, tilt {:.4}rad",
            height_error,
            tilt_error.angle()
        );
    }

    fn apply(&self, pose: &Pose3D) -> Pose3D {
        let mut corrected = *pose;
        corrected.orientation = self.state.rotation * pose.orientation;
        corrected.position.z += self.state.height_offset;
        corrected
    }
}
