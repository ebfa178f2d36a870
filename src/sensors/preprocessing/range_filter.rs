//! Range gating and crop-box removal.
//!
//! Removes returns that are too close (self-reflections off the robot body),
//! too far, non-finite, or inside the configured crop volume.

use serde::{Deserialize, Serialize};

use crate::core::types::PointCloud3D;

/// Configuration for range filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeFilterConfig {
    /// Minimum valid range in meters.
    ///
    /// Points closer than this are removed.
    /// Default: 0.5m
    pub min_range: f32,

    /// Maximum valid range in meters.
    ///
    /// Default: 100.0m
    pub max_range: f32,
}

impl Default for RangeFilterConfig {
    fn default() -> Self {
        Self {
            min_range: 0.5,
            max_range: 100.0,
        }
    }
}

/// Range filter for removing invalid returns.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    config: RangeFilterConfig,
}

impl RangeFilter {
    /// Create a new range filter with the given configuration.
    pub fn new(config: RangeFilterConfig) -> Self {
        Self { config }
    }

    /// Check if a squared range is inside the valid band.
    #[inline]
    pub fn is_valid(&self, range_sq: f32) -> bool {
        range_sq.is_finite()
            && range_sq >= self.config.min_range * self.config.min_range
            && range_sq <= self.config.max_range * self.config.max_range
    }

    /// Apply range filtering.
    pub fn apply(&self, cloud: &PointCloud3D) -> PointCloud3D {
        cloud.filtered(|p| self.is_valid(p.coords.norm_squared()))
    }
}

/// Configuration for the crop box around the sensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CropBoxConfig {
    /// Enable crop-box removal.
    pub enabled: bool,

    /// Half-size of the cube centered on the sensor (meters).
    ///
    /// Default: 1.0m
    pub size: f32,
}

impl Default for CropBoxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 1.0,
        }
    }
}

/// Removes every point inside an axis-aligned cube centered on the sensor.
#[derive(Debug, Clone)]
pub struct CropBoxFilter {
    config: CropBoxConfig,
}

impl CropBoxFilter {
    /// Create a new crop-box filter.
    pub fn new(config: CropBoxConfig) -> Self {
        Self { config }
    }

    /// Apply the crop box. Returns a copy of the input when disabled.
    pub fn apply(&self, cloud: &PointCloud3D) -> PointCloud3D {
        if !self.config.enabled {
            return cloud.clone();
        }
        let s = self.config.size;
        cloud.filtered(|p| !(p.x.abs() <= s && p.y.abs() <= s && p.z.abs() <= s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn cloud(points: &[[f32; 3]]) -> PointCloud3D {
        points.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect()
    }

    #[test]
    fn test_range_filter_bounds() {
        let filter = RangeFilter::new(RangeFilterConfig {
            min_range: 1.0,
            max_range: 10.0,
        });
        let input = cloud(&[
            [0.5, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [5.0, 5.0, 0.0],
            [20.0, 0.0, 0.0],
            [f32::NAN, 0.0, 0.0],
        ]);

        let out = filter.apply(&input);

        assert_eq!(out.len(), 2);
        assert_eq!(out.points[0], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_crop_box_removes_inside() {
        let filter = CropBoxFilter::new(CropBoxConfig {
            enabled: true,
            size: 1.0,
        });
        let input = cloud(&[[0.5, 0.5, 0.5], [1.5, 0.0, 0.0], [0.2, -0.3, 2.0]]);

        let out = filter.apply(&input);

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.x.abs() > 1.0 || p.z.abs() > 1.0));
    }

    #[test]
    fn test_crop_box_disabled_passthrough() {
        let filter = CropBoxFilter::new(CropBoxConfig {
            enabled: false,
            size: 1.0,
        });
        let input = cloud(&[[0.1, 0.1, 0.1]]);
        assert_eq!(filter.apply(&input), input);
    }
}
