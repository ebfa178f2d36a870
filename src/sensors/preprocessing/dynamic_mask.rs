//! Dynamic-object masking from detector boxes.
//!
//! The external detector reports oriented boxes per frame. Frames are kept in
//! a bounded time-sorted buffer behind their own lock so the detector thread
//! never waits on sweep processing for longer than one insert. When a sweep
//! is processed, the frame closest in time (within a tolerance) is looked up
//! and every point strictly inside one of its boxes is removed.
//!
//! The masked sweep is what gets registered *and* what gets stored when the
//! sweep becomes a keyframe, so moving objects never enter the submap.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::buffer::TimeSortedBuffer;
use crate::core::types::{DetectionFrame, OrientedBox, PointCloud3D};

/// Configuration for the dynamic-object mask.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicMaskConfig {
    /// Enable masking. When disabled, sweeps pass through untouched.
    pub enabled: bool,

    /// Number of detection frames kept.
    ///
    /// Default: 50
    pub buffer_size: usize,

    /// Largest allowed gap between sweep and detection timestamps (seconds).
    ///
    /// Default: 0.1s
    pub max_time_offset: f32,

    /// Extra margin added to every box half-extent (meters).
    ///
    /// Default: 0.0m
    pub margin: f32,
}

impl Default for DynamicMaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 50,
            max_time_offset: 0.1,
            margin: 0.0,
        }
    }
}

/// Thread-safe buffer of detection frames.
pub struct DetectionBuffer {
    frames: Mutex<TimeSortedBuffer<DetectionFrame>>,
}

impl DetectionBuffer {
    /// Create a buffer holding `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(TimeSortedBuffer::new(capacity)),
        }
    }

    /// Append a detection frame, evicting the oldest on overflow.
    pub fn push(&self, frame: DetectionFrame) {
        let mut frames = self.frames.lock();
        if frames.push(frame).is_some() {
            log::trace!("Detection buffer full, evicted oldest frame");
        }
    }

    /// Boxes of the frame closest to `timestamp_us`, if within tolerance.
    pub fn boxes_near(&self, timestamp_us: u64, tolerance_us: u64) -> Option<Vec<OrientedBox>> {
        self.frames
            .lock()
            .nearest(timestamp_us, tolerance_us)
            .map(|frame| frame.data.clone())
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

/// Result of masking one sweep.
#[derive(Debug, Clone)]
pub struct MaskOutcome {
    /// Static-scene sweep
    pub cloud: PointCloud3D,
    /// Number of points removed
    pub removed: usize,
    /// False when no detection frame matched the sweep timestamp
    pub matched_frame: bool,
}

/// Removes points inside detected object boxes.
#[derive(Debug, Clone)]
pub struct DynamicObjectMask {
    config: DynamicMaskConfig,
}

impl DynamicObjectMask {
    /// Create a new mask.
    pub fn new(config: DynamicMaskConfig) -> Self {
        Self { config }
    }

    /// Get configuration.
    pub fn config(&self) -> &DynamicMaskConfig {
        &self.config
    }

    /// Remove points strictly inside any of `boxes`.
    pub fn apply(&self, cloud: &PointCloud3D, boxes: &[OrientedBox]) -> PointCloud3D {
        if boxes.is_empty() {
            return cloud.clone();
        }
        let margin = self.config.margin;
        // Bounding-sphere radius per box for a cheap reject
        let spheres: Vec<f32> = boxes
            .iter()
            .map(|b| {
                let r = b.half_extents.norm() + margin * 3f32.sqrt();
                r * r
            })
            .collect();

        cloud.filtered(|p| {
            !boxes.iter().zip(&spheres).any(|(b, r_sq)| {
                (p - b.center).norm_squared() < *r_sq && b.contains(p, margin)
            })
        })
    }

    /// Mask a sweep using the detection frame closest to its timestamp.
    pub fn mask_sweep(
        &self,
        cloud: &PointCloud3D,
        timestamp_us: u64,
        buffer: &DetectionBuffer,
    ) -> MaskOutcome {
        if !self.config.enabled {
            return MaskOutcome {
                cloud: cloud.clone(),
                removed: 0,
                matched_frame: true,
            };
        }

        let tolerance_us = (self.config.max_time_offset.max(0.0) as f64 * 1e6) as u64;
        match buffer.boxes_near(timestamp_us, tolerance_us) {
            Some(boxes) => {
                let masked = self.apply(cloud, &boxes);
                let removed = cloud.len() - masked.len();
                if removed > 0 {
                    log::trace!("Masked {} points in {} boxes", removed, boxes.len());
                }
                MaskOutcome {
                    cloud: masked,
                    removed,
                    matched_frame: true,
                }
            }
            None => MaskOutcome {
                cloud: cloud.clone(),
                removed: 0,
                matched_frame: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Timestamped;
    use nalgebra::{Point3, UnitQuaternion, Vector3};

    fn test_cloud() -> PointCloud3D {
        vec![
            Point3::new(5.0, 0.0, 0.0),  // inside the box
            Point3::new(5.9, 0.9, 0.0),  // inside near the corner
            Point3::new(7.0, 0.0, 0.0),  // outside
            Point3::new(-5.0, 0.0, 0.0), // far away
        ]
        .into_iter()
        .collect()
    }

    fn car_box() -> OrientedBox {
        OrientedBox::axis_aligned(Point3::new(5.0, 0.0, 0.0), Vector3::new(2.0, 2.0, 2.0))
    }

    #[test]
    fn test_points_inside_box_removed() {
        let mask = DynamicObjectMask::new(DynamicMaskConfig::default());
        let buffer = DetectionBuffer::new(10);
        buffer.push(Timestamped::new(vec![car_box()], 1_000_000));

        let out = mask.mask_sweep(&test_cloud(), 1_020_000, &buffer);

        assert!(out.matched_frame);
        assert_eq!(out.removed, 2);
        assert_eq!(out.cloud.len(), 2);
        assert!(!out.cloud.points.contains(&Point3::new(5.0, 0.0, 0.0)));
        assert!(out.cloud.points.contains(&Point3::new(7.0, 0.0, 0.0)));
        assert!(out.cloud.points.contains(&Point3::new(-5.0, 0.0, 0.0)));
    }

    #[test]
    fn test_stale_detection_is_not_used() {
        let mask = DynamicObjectMask::new(DynamicMaskConfig::default());
        let buffer = DetectionBuffer::new(10);
        buffer.push(Timestamped::new(vec![car_box()], 1_000_000));

        // 0.5s later: outside the 0.1s tolerance
        let out = mask.mask_sweep(&test_cloud(), 1_500_000, &buffer);

        assert!(!out.matched_frame);
        assert_eq!(out.cloud.len(), 4);
    }

    #[test]
    fn test_nearest_frame_selected() {
        let mask = DynamicObjectMask::new(DynamicMaskConfig::default());
        let buffer = DetectionBuffer::new(10);
        let elsewhere =
            OrientedBox::axis_aligned(Point3::new(-5.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        buffer.push(Timestamped::new(vec![car_box()], 1_000_000));
        buffer.push(Timestamped::new(vec![elsewhere], 1_080_000));

        let out = mask.mask_sweep(&test_cloud(), 1_070_000, &buffer);

        assert_eq!(out.cloud.len(), 3);
        assert!(!out.cloud.points.contains(&Point3::new(-5.0, 0.0, 0.0)));
    }

    #[test]
    fn test_rotated_box() {
        let mask = DynamicObjectMask::new(DynamicMaskConfig::default());
        let yawed = OrientedBox::new(
            Point3::new(5.0, 0.0, 0.0),
            Vector3::new(4.0, 0.4, 1.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f32::consts::FRAC_PI_2),
        );
        let cloud: PointCloud3D = vec![Point3::new(5.0, 1.5, 0.0), Point3::new(6.5, 0.0, 0.0)]
            .into_iter()
            .collect();

        let out = mask.apply(&cloud, &[yawed]);

        assert_eq!(out.points, vec![Point3::new(6.5, 0.0, 0.0)]);
    }

    #[test]
    fn test_disabled_mask_passthrough() {
        let mask = DynamicObjectMask::new(DynamicMaskConfig {
            enabled: false,
            ..Default::default()
        });
        let buffer = DetectionBuffer::new(10);
        buffer.push(Timestamped::new(vec![car_box()], 0));

        let out = mask.mask_sweep(&test_cloud(), 0, &buffer);
        assert_eq!(out.cloud.len(), 4);
        assert!(out.matched_frame);
    }
}
