//! Externally detected object boxes.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use super::timestamped::Timestamped;

/// Oriented 3D bounding box of one detected object, in the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    /// Box center
    pub center: Point3<f32>,
    /// Half of the box size along its local x, y, z axes
    pub half_extents: Vector3<f32>,
    /// Box orientation relative to the sensor frame
    pub orientation: UnitQuaternion<f32>,
}

impl OrientedBox {
    /// Create a box from center, full dimensions and orientation.
    pub fn new(
        center: Point3<f32>,
        dimensions: Vector3<f32>,
        orientation: UnitQuaternion<f32>,
    ) -> Self {
        Self {
            center,
            half_extents: dimensions * 0.5,
            orientation,
        }
    }

    /// Axis-aligned box (no rotation).
    pub fn axis_aligned(center: Point3<f32>, dimensions: Vector3<f32>) -> Self {
        Self::new(center, dimensions, UnitQuaternion::identity())
    }

    /// True if the point lies strictly inside the box grown by `margin`.
    #[inline]
    pub fn contains(&self, point: &Point3<f32>, margin: f32) -> bool {
        let local = self.orientation.inverse_transform_vector(&(point - self.center));
        local.x.abs() < self.half_extents.x + margin
            && local.y.abs() < self.half_extents.y + margin
            && local.z.abs() < self.half_extents.z + margin
    }
}

/// All boxes reported by the detector for one frame.
pub type DetectionFrame = Timestamped<Vec<OrientedBox>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_axis_aligned() {
        let b = OrientedBox::axis_aligned(Point3::new(5.0, 0.0, 0.0), Vector3::new(2.0, 2.0, 2.0));

        assert!(b.contains(&Point3::new(5.5, 0.5, -0.5), 0.0));
        assert!(!b.contains(&Point3::new(6.5, 0.0, 0.0), 0.0));
        // Boundary is outside
        assert!(!b.contains(&Point3::new(6.0, 0.0, 0.0), 0.0));
        assert!(b.contains(&Point3::new(6.0, 0.0, 0.0), 0.1));
    }

    #[test]
    fn test_contains_rotated() {
        // 4m x 0.5m box rotated 90° about z: long axis along sensor y
        let b = OrientedBox::new(
            Point3::origin(),
            Vector3::new(4.0, 0.5, 1.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f32::consts::FRAC_PI_2),
        );

        assert!(b.contains(&Point3::new(0.0, 1.8, 0.0), 0.0));
        assert!(!b.contains(&Point3::new(1.8, 0.0, 0.0), 0.0));
    }
}
