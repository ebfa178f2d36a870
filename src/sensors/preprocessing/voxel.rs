//! Voxel-grid downsampling.
//!
//! Bins points into cubic voxels and replaces each occupied voxel with the
//! centroid of its points. Output order follows the first point that touched
//! each voxel, so the result is deterministic for a given input.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::types::PointCloud3D;

/// Configuration for voxel downsampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelConfig {
    /// Enable downsampling.
    pub enabled: bool,

    /// Voxel edge length in meters.
    ///
    /// Default: 0.25m
    pub resolution: f32,
}

impl Default for VoxelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 0.25,
        }
    }
}

struct VoxelAccumulator {
    sum: Vector3<f32>,
    intensity: f32,
    count: u32,
}

/// Centroid voxel filter.
#[derive(Debug, Clone)]
pub struct VoxelDownsampler {
    config: VoxelConfig,
}

impl VoxelDownsampler {
    /// Create a new voxel downsampler.
    pub fn new(config: VoxelConfig) -> Self {
        Self { config }
    }

    /// Apply downsampling. Returns a copy of the input when disabled.
    pub fn apply(&self, cloud: &PointCloud3D) -> PointCloud3D {
        if !self.config.enabled || cloud.is_empty() {
            return cloud.clone();
        }

        let inv = 1.0 / self.config.resolution;
        let mut slots: HashMap<(i32, i32, i32), usize> = HashMap::with_capacity(cloud.len() / 2);
        let mut voxels: Vec<VoxelAccumulator> = Vec::with_capacity(cloud.len() / 2);

        for (i, p) in cloud.points.iter().enumerate() {
            let key = (
                (p.x * inv).floor() as i32,
                (p.y * inv).floor() as i32,
                (p.z * inv).floor() as i32,
            );
            let intensity = cloud.intensity_at(i).unwrap_or(0.0);
            let slot = *slots.entry(key).or_insert_with(|| {
                voxels.push(VoxelAccumulator {
                    sum: Vector3::zeros(),
                    intensity: 0.0,
                    count: 0,
                });
                voxels.len() - 1
            });
            let voxel = &mut voxels[slot];
            voxel.sum += p.coords;
            voxel.intensity += intensity;
            voxel.count += 1;
        }

        let points = voxels
            .iter()
            .map(|v| Point3::from(v.sum / v.count as f32))
            .collect();
        let intensities = cloud.intensities.as_ref().map(|_| {
            voxels
                .iter()
                .map(|v| v.intensity / v.count as f32)
                .collect()
        });

        PointCloud3D {
            points,
            intensities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_points_in_same_voxel_merge_to_centroid() {
        let filter = VoxelDownsampler::new(VoxelConfig {
            enabled: true,
            resolution: 1.0,
        });
        let mut cloud = PointCloud3D::new();
        cloud.push_with_intensity(Point3::new(0.2, 0.2, 0.2), 10.0);
        cloud.push_with_intensity(Point3::new(0.4, 0.6, 0.8), 30.0);
        cloud.push_with_intensity(Point3::new(3.5, 0.5, 0.5), 5.0);

        let out = filter.apply(&cloud);

        assert_eq!(out.len(), 2);
        assert_relative_eq!(out.points[0], Point3::new(0.3, 0.4, 0.5), epsilon = 1e-6);
        assert_relative_eq!(out.intensity_at(0).unwrap(), 20.0);
        assert_relative_eq!(out.points[1], Point3::new(3.5, 0.5, 0.5));
    }

    #[test]
    fn test_negative_coordinates_bin_separately() {
        let filter = VoxelDownsampler::new(VoxelConfig {
            enabled: true,
            resolution: 1.0,
        });
        let cloud: PointCloud3D = vec![Point3::new(-0.1, 0.0, 0.0), Point3::new(0.1, 0.0, 0.0)]
            .into_iter()
            .collect();

        assert_eq!(filter.apply(&cloud).len(), 2);
    }

    #[test]
    fn test_disabled_passthrough() {
        let filter = VoxelDownsampler::new(VoxelConfig {
            enabled: false,
            resolution: 1.0,
        });
        let cloud: PointCloud3D = vec![Point3::new(0.1, 0.0, 0.0), Point3::new(0.2, 0.0, 0.0)]
            .into_iter()
            .collect();

        assert_eq!(filter.apply(&cloud).len(), 2);
    }
}
