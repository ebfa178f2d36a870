//! Main GatiConfig, validation and conversion.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::sections::{FramesConfig, ThreadsConfig};
use crate::algorithms::adaptive::AdaptiveConfig;
use crate::algorithms::ground::GroundConfig;
use crate::algorithms::registration::{GicpConfig, RegistrationConfig};
use crate::engine::odometry::{InitialPoseConfig, KeyframeConfig, OdometryConfig, SubmapConfig};
use crate::sensors::imu::ImuConfig;
use crate::sensors::preprocessing::{DynamicMaskConfig, PreprocessorConfig};

/// Default config location, relative to the working directory.
const DEFAULT_PATH: &str = "configs/gati.toml";

/// Full Gati configuration loaded from TOML.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatiConfig {
    pub frames: FramesConfig,
    pub preprocessing: PreprocessorConfig,
    pub detection: DynamicMaskConfig,
    pub imu: ImuConfig,
    pub keyframe: KeyframeConfig,
    pub submap: SubmapConfig,
    pub registration: RegistrationConfig,
    pub adaptive: AdaptiveConfig,
    pub ground: GroundConfig,
    pub initial_pose: InitialPoseConfig,
    pub threads: ThreadsConfig,
}

impl GatiConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from `configs/gati.toml`, or defaults when the file is absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Engine configuration.
    pub fn odometry(&self) -> OdometryConfig {
        OdometryConfig {
            preprocessing: self.preprocessing.clone(),
            detection: self.detection,
            imu: self.imu,
            keyframe: self.keyframe.clone(),
            submap: self.submap.clone(),
            registration: self.registration,
            adaptive: self.adaptive.clone(),
            ground: self.ground.clone(),
            initial_pose: self.initial_pose.clone(),
        }
    }

    /// Reject parameter combinations the odometry cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.imu.enabled && self.imu.buffer_size == 0 {
            return Err(ConfigError::invalid("imu.buffer_size", "must be at least 1"));
        }
        if self.imu.calibration_time < 0.0 {
            return Err(ConfigError::invalid(
                "imu.calibration_time",
                "must not be negative",
            ));
        }
        if self.detection.enabled && self.detection.buffer_size == 0 {
            return Err(ConfigError::invalid(
                "detection.buffer_size",
                "must be at least 1",
            ));
        }

        let voxel = &self.preprocessing.voxel;
        if voxel.enabled && voxel.resolution <= 0.0 {
            return Err(ConfigError::invalid(
                "preprocessing.voxel.resolution",
                "must be positive",
            ));
        }
        let range = &self.preprocessing.range;
        if range.min_range < 0.0 || range.max_range <= range.min_range {
            return Err(ConfigError::invalid(
                "preprocessing.range",
                format!(
                    "need 0 <= min_range < max_range, got {} and {}",
                    range.min_range, range.max_range
                ),
            ));
        }

        if self.keyframe.thresh_dist <= 0.0 {
            return Err(ConfigError::invalid("keyframe.thresh_dist", "must be positive"));
        }
        if self.keyframe.thresh_rot_deg <= 0.0 {
            return Err(ConfigError::invalid(
                "keyframe.thresh_rot_deg",
                "must be positive",
            ));
        }

        let submap = &self.submap;
        if submap.knn == 0 && submap.kcv == 0 && submap.kcc == 0 {
            return Err(ConfigError::invalid(
                "submap",
                "at least one of knn, kcv, kcc must be non-zero",
            ));
        }
        if submap.concave_alpha <= 0.0 {
            return Err(ConfigError::invalid("submap.concave_alpha", "must be positive"));
        }
        if submap.kcc > 0 && 2.0 * submap.concave_alpha <= self.keyframe.thresh_dist {
            return Err(ConfigError::invalid(
                "submap.concave_alpha",
                format!(
                    "boundary edges of at most {} m cannot join keyframes spaced {} m apart",
                    2.0 * submap.concave_alpha,
                    self.keyframe.thresh_dist
                ),
            ));
        }
        if submap.hull_candidate_radius < 0.0 {
            return Err(ConfigError::invalid(
                "submap.hull_candidate_radius",
                "must not be negative",
            ));
        }
        if submap.voxel.enabled && submap.voxel.resolution <= 0.0 {
            return Err(ConfigError::invalid(
                "submap.voxel.resolution",
                "must be positive",
            ));
        }

        validate_gicp("registration.s2s", &self.registration.s2s)?;
        validate_gicp("registration.s2m", &self.registration.s2m)?;

        if self.adaptive.enabled {
            if self.adaptive.history_len == 0 {
                return Err(ConfigError::invalid(
                    "adaptive.history_len",
                    "must be at least 1",
                ));
            }
            if !self.adaptive.is_monotone() {
                return Err(ConfigError::invalid(
                    "adaptive.breakpoints",
                    "spaciousness and factor must be non-decreasing",
                ));
            }
            if self.adaptive.breakpoints.iter().any(|b| b.factor <= 0.0) {
                return Err(ConfigError::invalid(
                    "adaptive.breakpoints",
                    "factors must be positive",
                ));
            }
        }

        if self.ground.enabled {
            let ground = &self.ground;
            if !(ground.gain > 0.0 && ground.gain <= 1.0) {
                return Err(ConfigError::invalid("ground.gain", "must be in (0, 1]"));
            }
            if ground.seed_points == 0 {
                return Err(ConfigError::invalid("ground.seed_points", "must be at least 1"));
            }
            if ground.seed_band <= 0.0 {
                return Err(ConfigError::invalid("ground.seed_band", "must be positive"));
            }
            if !(ground.min_upright > 0.0 && ground.min_upright <= 1.0) {
                return Err(ConfigError::invalid("ground.min_upright", "must be in (0, 1]"));
            }
        }

        if self.initial_pose.enabled && self.initial_pose.pose().is_none() {
            return Err(ConfigError::invalid(
                "initial_pose.orientation",
                "quaternion cannot be normalised",
            ));
        }

        if self.threads.sweep_queue == 0 {
            return Err(ConfigError::invalid("threads.sweep_queue", "must be at least 1"));
        }
        if self.threads.event_queue == 0 {
            return Err(ConfigError::invalid("threads.event_queue", "must be at least 1"));
        }

        Ok(())
    }
}

fn validate_gicp(field: &'static str, config: &GicpConfig) -> Result<(), ConfigError> {
    if config.k_correspondences < 3 {
        return Err(ConfigError::invalid(field, "k_correspondences must be at least 3"));
    }
    if config.max_iterations == 0 {
        return Err(ConfigError::invalid(field, "max_iterations must be at least 1"));
    }
    if config.max_correspondence_distance <= 0.0 {
        return Err(ConfigError::invalid(
            field,
            "max_correspondence_distance must be positive",
        ));
    }
    if config.transformation_epsilon < 0.0 || config.fitness_epsilon < 0.0 {
        return Err(ConfigError::invalid(field, "epsilons must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames.odom_frame, "odom");
        assert_eq!(config.registration.min_points, 100);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GatiConfig::from_toml(
            r#"
            [keyframe]
            thresh_dist = 2.5

            [registration.s2m]
            max_iterations = 10

            [adaptive]
            smoothing = "mean"
            "#,
        )
        .unwrap();

        assert_eq!(config.keyframe.thresh_dist, 2.5);
        assert_eq!(config.keyframe.thresh_rot_deg, 15.0);
        assert_eq!(config.registration.s2m.max_iterations, 10);
        assert_eq!(config.registration.s2m.k_correspondences, 20);
        assert_eq!(
            config.adaptive.smoothing,
            crate::algorithms::adaptive::Smoothing::Mean
        );
    }

    #[test]
    fn test_parse_error() {
        let err = GatiConfig::from_toml("[keyframe]\nthresh_dist = \"far\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_small_k() {
        let mut config = GatiConfig::default();
        config.registration.s2s.k_correspondences = 2;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "registration.s2s",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_empty_submap_selection() {
        let mut config = GatiConfig::default();
        config.submap.knn = 0;
        config.submap.kcv = 0;
        config.submap.kcc = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_alpha_below_keyframe_spacing() {
        let mut config = GatiConfig::default();
        config.submap.concave_alpha = 0.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "submap.concave_alpha",
                ..
            }
        ));

        // Unused when the concave selector is off
        config.submap.kcc = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_ground_gain() {
        let mut config = GatiConfig::default();
        config.ground.enabled = true;
        config.ground.gain = 1.5;
        assert!(config.validate().is_err());
        config.ground.gain = 0.0;
        assert!(config.validate().is_err());
        config.ground.gain = 1.0;
        assert!(config.validate().is_ok());

        config.ground.min_upright = 0.0;
        assert!(config.validate().is_err());
        config.ground.min_upright = 0.85;
        config.ground.seed_band = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_quaternion() {
        let mut config = GatiConfig::default();
        config.initial_pose.enabled = true;
        config.initial_pose.orientation = [0.0; 4];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_monotone_breakpoints() {
        let config = GatiConfig::from_toml(
            r#"
            [[adaptive.breakpoints]]
            spaciousness = 1.0
            factor = 2.0

            [[adaptive.breakpoints]]
            spaciousness = 0.5
            factor = 1.0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gati.toml");
        std::fs::write(&path, "[ground]\nenabled = true\ngain = 0.5\n").unwrap();

        let config = GatiConfig::load(&path).unwrap();
        assert!(config.ground.enabled);
        assert_eq!(config.ground.gain, 0.5);

        let missing = GatiConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/configs/gati.toml"));
        let config = GatiConfig::load(path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.adaptive.breakpoints.len(), 4);
        assert_eq!(config.registration.s2m.k_correspondences, 20);
    }

    #[test]
    fn test_odometry_conversion() {
        let mut config = GatiConfig::default();
        config.keyframe.thresh_dist = 3.0;
        config.imu.enabled = false;
        let odometry = config.odometry();
        assert_eq!(odometry.keyframe.thresh_dist, 3.0);
        assert!(!odometry.imu.enabled);
    }
}
