//! Sweep preprocessing.
//!
//! Turns a raw sweep into the cloud that registration consumes.
//!
//! # Pipeline
//!
//! ```text
//! raw sweep → RangeFilter → CropBoxFilter → VoxelDownsampler → DynamicObjectMask → static sweep
//! ```
//!
//! The first three stages are stateless and live in [`SweepPreprocessor`].
//! Masking needs the detection buffer, so it runs as a separate step in the
//! odometry engine.

mod dynamic_mask;
mod range_filter;
mod voxel;

pub use dynamic_mask::{DetectionBuffer, DynamicMaskConfig, DynamicObjectMask, MaskOutcome};
pub use range_filter::{CropBoxConfig, CropBoxFilter, RangeFilter, RangeFilterConfig};
pub use voxel::{VoxelConfig, VoxelDownsampler};

use serde::{Deserialize, Serialize};

use crate::core::types::PointCloud3D;

/// Common interface of the stateless sweep filters.
pub trait SweepFilter: Send + Sync {
    /// Apply the filter, returning a new cloud.
    fn filter(&self, cloud: &PointCloud3D) -> PointCloud3D;

    /// Name of this filter for diagnostics.
    fn name(&self) -> &'static str;
}

impl SweepFilter for RangeFilter {
    fn filter(&self, cloud: &PointCloud3D) -> PointCloud3D {
        self.apply(cloud)
    }

    fn name(&self) -> &'static str {
        "RangeFilter"
    }
}

impl SweepFilter for CropBoxFilter {
    fn filter(&self, cloud: &PointCloud3D) -> PointCloud3D {
        self.apply(cloud)
    }

    fn name(&self) -> &'static str {
        "CropBoxFilter"
    }
}

impl SweepFilter for VoxelDownsampler {
    fn filter(&self, cloud: &PointCloud3D) -> PointCloud3D {
        self.apply(cloud)
    }

    fn name(&self) -> &'static str {
        "VoxelDownsampler"
    }
}

/// Configuration for the preprocessing pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    /// Range gate
    pub range: RangeFilterConfig,
    /// Crop volume around the sensor
    pub crop: CropBoxConfig,
    /// Voxel downsampling of the sweep
    pub voxel: VoxelConfig,
}

/// Stateless preprocessing pipeline.
pub struct SweepPreprocessor {
    stages: Vec<Box<dyn SweepFilter>>,
}

impl SweepPreprocessor {
    /// Create a new preprocessor with the given configuration.
    pub fn new(config: &PreprocessorConfig) -> Self {
        let stages: Vec<Box<dyn SweepFilter>> = vec![
            Box::new(RangeFilter::new(config.range)),
            Box::new(CropBoxFilter::new(config.crop)),
            Box::new(VoxelDownsampler::new(config.voxel)),
        ];
        Self { stages }
    }

    /// Run every stage in order.
    ///
    /// Steps:
    /// 1. Range gate (removes close self-returns and far outliers)
    /// 2. Crop box around the sensor
    /// 3. Voxel downsampling
    pub fn process(&self, cloud: &PointCloud3D) -> PointCloud3D {
        let mut current = cloud.clone();
        for stage in &self.stages {
            let before = current.len();
            current = stage.filter(&current);
            log::trace!("{}: {} -> {} points", stage.name(), before, current.len());
        }
        current
    }
}

impl Default for SweepPreprocessor {
    fn default() -> Self {
        Self::new(&PreprocessorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_pipeline_applies_all_stages() {
        let config = PreprocessorConfig {
            range: RangeFilterConfig {
                min_range: 0.2,
                max_range: 50.0,
            },
            crop: CropBoxConfig {
                enabled: true,
                size: 1.0,
            },
            voxel: VoxelConfig {
                enabled: true,
                resolution: 0.5,
            },
        };
        let preprocessor = SweepPreprocessor::new(&config);

        let cloud: PointCloud3D = vec![
            Point3::new(0.1, 0.0, 0.0),  // too close
            Point3::new(0.8, 0.0, 0.0),  // inside crop box
            Point3::new(60.0, 0.0, 0.0), // too far
            Point3::new(3.1, 0.1, 0.1),  // kept, merged with next
            Point3::new(3.2, 0.2, 0.2),
            Point3::new(6.1, 0.1, 0.1), // kept
        ]
        .into_iter()
        .collect();

        let out = preprocessor.process(&cloud);

        assert_eq!(out.len(), 2);
    }
}
