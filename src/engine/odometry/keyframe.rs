//! Keyframe management for odometry.
//!
//! Keyframes are pose-stamped static sweeps that make up the local map.
//! Not every sweep becomes a keyframe, only those that moved or rotated far
//! enough from the nearest existing keyframe. Keyframes are never removed.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::algorithms::registration::CovarianceCloud;
use crate::core::types::Pose3D;

/// A keyframe: a static sweep in the sensor frame plus its corrected pose.
#[derive(Debug, Clone)]
pub struct Keyframe {
    /// Sequential identifier (insertion order).
    pub id: u64,

    /// World pose of the sensor when the sweep was captured.
    pub pose: Pose3D,

    /// Masked sweep with covariances, in the sensor frame.
    pub cloud: CovarianceCloud,

    /// Capture time (microseconds).
    pub timestamp_us: u64,
}

impl Keyframe {
    /// Sensor position in the world.
    pub fn position(&self) -> Point3<f32> {
        Point3::from(self.pose.position)
    }
}

/// Configuration for keyframe selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    /// Translation (meters) from the nearest keyframe that creates a new one.
    pub thresh_dist: f32,

    /// Rotation (degrees) from the nearest keyframe that creates a new one.
    pub thresh_rot_deg: f32,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            thresh_dist: 1.0,
            thresh_rot_deg: 15.0,
        }
    }
}

/// Whether any keyframe exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyframeState {
    NoKeyframes,
    HasKeyframes,
}

/// Decides when to create keyframes and stores them.
#[derive(Debug)]
pub struct KeyframeManager {
    config: KeyframeConfig,

    /// All keyframes in creation order.
    keyframes: Vec<Keyframe>,

    next_id: u64,
}

impl KeyframeManager {
    /// Create an empty manager.
    pub fn new(config: KeyframeConfig) -> Self {
        Self {
            config,
            keyframes: Vec::new(),
            next_id: 0,
        }
    }

    pub fn config(&self) -> &KeyframeConfig {
        &self.config
    }

    pub fn state(&self) -> KeyframeState {
        if self.keyframes.is_empty() {
            KeyframeState::NoKeyframes
        } else {
            KeyframeState::HasKeyframes
        }
    }

    /// Check whether `pose` warrants a new keyframe.
    ///
    /// Compares against the keyframe nearest in position. Either threshold
    /// reached (inclusive) creates one; the first pose always does.
    pub fn should_create(&self, pose: &Pose3D) -> bool {
        let Some(nearest) = self.nearest(pose) else {
            return true;
        };

        let translation = nearest.pose.translation_distance(pose);
        if translation >= self.config.thresh_dist {
            return true;
        }

        let rotation = nearest.pose.angular_distance(pose).to_degrees();
        rotation >= self.config.thresh_rot_deg
    }

    /// Insert a keyframe unconditionally.
    pub fn insert(&mut self, pose: Pose3D, cloud: CovarianceCloud, timestamp_us: u64) -> &Keyframe {
        let id = self.next_id;
        self.next_id += 1;

        log::debug!(
            "Keyframe {} at [{:.2}, {:.2}, {:.2}] ({} points)",
            id,
            pose.position.x,
            pose.position.y,
            pose.position.z,
            cloud.len()
        );

        self.keyframes.push(Keyframe {
            id,
            pose,
            cloud,
            timestamp_us,
        });
        &self.keyframes[self.keyframes.len() - 1]
    }

    /// Insert a keyframe if `pose` passes [`Self::should_create`].
    ///
    /// `cloud` is only invoked when a keyframe is created.
    pub fn evaluate<F>(&mut self, pose: &Pose3D, timestamp_us: u64, cloud: F) -> Option<&Keyframe>
    where
        F: FnOnce() -> CovarianceCloud,
    {
        if self.should_create(pose) {
            Some(self.insert(*pose, cloud(), timestamp_us))
        } else {
            None
        }
    }

    /// Keyframe nearest to `pose` by position.
    pub fn nearest(&self, pose: &Pose3D) -> Option<&Keyframe> {
        self.keyframes.iter().min_by(|a, b| {
            let da = (a.pose.position - pose.position).norm_squared();
            let db = (b.pose.position - pose.position).norm_squared();
            da.total_cmp(&db)
        })
    }

    /// All keyframes.
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Most recent keyframe.
    pub fn latest(&self) -> Option<&Keyframe> {
        self.keyframes.last()
    }

    /// Keyframe positions, index-aligned with [`Self::keyframes`].
    pub fn positions(&self) -> Vec<Point3<f32>> {
        self.keyframes.iter().map(Keyframe::position).collect()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    fn cloud() -> CovarianceCloud {
        let points = (0..10)
            .map(|i| Point3::new(i as f32 * 0.1, 0.0, 0.0))
            .collect();
        CovarianceCloud::from_points(points, 3)
    }

    fn manager() -> KeyframeManager {
        KeyframeManager::new(KeyframeConfig {
            thresh_dist: 1.0,
            thresh_rot_deg: 10.0,
        })
    }

    #[test]
    fn test_first_pose_always_creates() {
        let mut manager = manager();
        assert_eq!(manager.state(), KeyframeState::NoKeyframes);

        let kf = manager.evaluate(&Pose3D::identity(), 0, cloud);
        assert_eq!(kf.map(|k| k.id), Some(0));
        assert_eq!(manager.state(), KeyframeState::HasKeyframes);
    }

    #[test]
    fn test_small_motion_does_not_create() {
        let mut manager = manager();
        manager.insert(Pose3D::identity(), cloud(), 0);

        let pose = Pose3D::new(
            Vector3::new(0.5, 0.2, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 5f32.to_radians()),
        );
        assert!(manager.evaluate(&pose, 1, cloud).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_distance_exactly_at_threshold_creates() {
        let mut manager = manager();
        manager.insert(Pose3D::identity(), cloud(), 0);

        let pose = Pose3D::from_translation(1.0, 0.0, 0.0);
        assert!(manager.should_create(&pose));
        assert!(manager.evaluate(&pose, 1, cloud).is_some());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_rotation_creates() {
        let mut manager = manager();
        manager.insert(Pose3D::identity(), cloud(), 0);

        let pose = Pose3D::new(
            Vector3::zeros(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 12f32.to_radians()),
        );
        assert!(manager.should_create(&pose));
    }

    #[test]
    fn test_compares_against_nearest_keyframe() {
        let mut manager = manager();
        manager.insert(Pose3D::identity(), cloud(), 0);
        manager.insert(Pose3D::from_translation(2.0, 0.0, 0.0), cloud(), 1);

        // Far from keyframe 0 but close to keyframe 1
        let pose = Pose3D::from_translation(2.3, 0.0, 0.0);
        assert!(!manager.should_create(&pose));
        assert_eq!(manager.nearest(&pose).map(|k| k.id), Some(1));
    }

    #[test]
    fn test_count_never_decreases() {
        let mut manager = manager();
        let mut last = 0;
        for i in 0..20 {
            let pose = Pose3D::from_translation(i as f32 * 0.4, 0.0, 0.0);
            manager.evaluate(&pose, i, cloud);
            assert!(manager.len() >= last);
            last = manager.len();
        }
        assert!(manager.len() > 1);
        assert_eq!(manager.latest().map(|k| k.id), Some(last as u64 - 1));
    }
}
