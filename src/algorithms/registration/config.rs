//! Registration parameter sets.

use serde::{Deserialize, Serialize};

/// Parameters of one GICP stage.
///
/// The sweep-to-sweep and sweep-to-submap stages each carry their own copy;
/// the adaptive controller rescales the search radius and iteration budget
/// of these base values every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GicpConfig {
    /// Neighbours used for each point's covariance.
    pub k_correspondences: usize,

    /// Correspondences farther than this are rejected (meters).
    pub max_correspondence_distance: f32,

    /// Iteration budget. This bounds the time spent in one alignment.
    pub max_iterations: u32,

    /// Stop when both the rotation (rad) and translation (m) of the update fall below this.
    pub transformation_epsilon: f32,

    /// Stop when the mean squared correspondence distance changes by less than this (m²).
    pub fitness_epsilon: f32,

    /// RANSAC hypotheses per iteration (0 disables pruning).
    pub ransac_iterations: u32,

    /// Point-to-plane residual above which a correspondence is an outlier (meters).
    pub ransac_inlier_threshold: f32,
}

impl GicpConfig {
    /// Defaults for sweep-to-sweep alignment.
    pub fn sweep_to_sweep() -> Self {
        Self {
            k_correspondences: 10,
            max_correspondence_distance: 1.0,
            max_iterations: 32,
            transformation_epsilon: 1e-3,
            fitness_epsilon: 1e-5,
            ransac_iterations: 5,
            ransac_inlier_threshold: 1.0,
        }
    }

    /// Defaults for sweep-to-submap alignment.
    pub fn sweep_to_submap() -> Self {
        Self {
            k_correspondences: 20,
            max_correspondence_distance: 0.5,
            ..Self::sweep_to_sweep()
        }
    }
}

impl Default for GicpConfig {
    fn default() -> Self {
        Self::sweep_to_sweep()
    }
}

/// Registration settings shared by both stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Fewest points a sweep (or target) needs for registration to run.
    pub min_points: usize,

    /// Sweep-to-sweep stage
    pub s2s: GicpConfig,

    /// Sweep-to-submap stage
    pub s2m: GicpConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            min_points: 100,
            s2s: GicpConfig::sweep_to_sweep(),
            s2m: GicpConfig::sweep_to_submap(),
        }
    }
}
