//! 6-DoF pose type.

use nalgebra::{Isometry3, Matrix3, Point3, Translation3, UnitQuaternion, Vector3};

/// Rigid transform produced by registration.
///
/// The rotation block is a unit quaternion, so it stays orthonormal
/// through any number of compositions.
pub type Transform3D = Isometry3<f32>;

/// Robot pose in 3D space.
///
/// Position in meters plus a unit quaternion orientation. The quaternion
/// type keeps the orientation normalized; the rotation matrix is derived
/// on demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3D {
    /// Position in meters
    pub position: Vector3<f32>,
    /// Orientation (always unit norm)
    pub orientation: UnitQuaternion<f32>,
}

impl Pose3D {
    /// Create a new pose.
    #[inline]
    pub fn new(position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Identity pose at origin.
    #[inline]
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Pose with only a translation.
    #[inline]
    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self::new(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    /// Build from a rigid transform.
    #[inline]
    pub fn from_isometry(iso: &Transform3D) -> Self {
        Self {
            position: iso.translation.vector,
            orientation: iso.rotation,
        }
    }

    /// Convert to a rigid transform.
    #[inline]
    pub fn to_isometry(&self) -> Transform3D {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Rotation matrix of the orientation.
    #[inline]
    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        self.orientation.to_rotation_matrix().into_inner()
    }

    /// Compose two poses: self ⊕ other.
    #[inline]
    pub fn compose(&self, other: &Pose3D) -> Pose3D {
        Pose3D {
            position: self.position + self.orientation * other.position,
            orientation: self.orientation * other.orientation,
        }
    }

    /// Inverse of this pose.
    #[inline]
    pub fn inverse(&self) -> Pose3D {
        let inv = self.orientation.inverse();
        Pose3D {
            position: -(inv * self.position),
            orientation: inv,
        }
    }

    /// Transform a point from local frame to global frame.
    #[inline]
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        Point3::from(self.orientation * point.coords + self.position)
    }

    /// Euclidean distance between positions.
    #[inline]
    pub fn translation_distance(&self, other: &Pose3D) -> f32 {
        (self.position - other.position).norm()
    }

    /// Angle of the relative rotation between two orientations (radians, in [0, π]).
    #[inline]
    pub fn angular_distance(&self, other: &Pose3D) -> f32 {
        self.orientation.angle_to(&other.orientation)
    }

    /// Roll, pitch, yaw in radians.
    #[inline]
    pub fn euler_angles(&self) -> (f32, f32, f32) {
        self.orientation.euler_angles()
    }
}

impl Default for Pose3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Transform3D> for Pose3D {
    fn from(iso: Transform3D) -> Self {
        Self::from_isometry(&iso)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_compose_inverse_is_identity() {
        let pose = Pose3D::new(
            Vector3::new(1.0, -2.0, 0.5),
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.7),
        );
        let result = pose.compose(&pose.inverse());

        assert_relative_eq!(result.position, Vector3::zeros(), epsilon = 1e-5);
        assert_relative_eq!(result.orientation.angle(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_compose_rotates_translation() {
        let a = Pose3D::new(
            Vector3::new(1.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_2),
        );
        let b = Pose3D::from_translation(1.0, 0.0, 0.0);
        let c = a.compose(&b);

        assert_relative_eq!(c.position, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_isometry_roundtrip_matches_compose() {
        let a = Pose3D::new(
            Vector3::new(0.3, 0.1, -0.4),
            UnitQuaternion::from_euler_angles(0.05, 0.0, 1.2),
        );
        let b = Pose3D::new(
            Vector3::new(-1.0, 2.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.3, -0.5),
        );
        let via_iso = Pose3D::from_isometry(&(a.to_isometry() * b.to_isometry()));
        let direct = a.compose(&b);

        assert_relative_eq!(via_iso.position, direct.position, epsilon = 1e-5);
        assert_relative_eq!(
            via_iso.orientation.angle_to(&direct.orientation),
            0.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_rotation_matrix_is_orthonormal() {
        let pose = Pose3D::new(
            Vector3::zeros(),
            UnitQuaternion::from_euler_angles(0.4, -1.1, 2.9),
        );
        let r = pose.rotation_matrix();

        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-5);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_angular_distance() {
        let a = Pose3D::identity();
        let b = Pose3D::new(
            Vector3::zeros(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3),
        );
        assert_relative_eq!(a.angular_distance(&b), 0.3, epsilon = 1e-5);
        assert_relative_eq!(a.translation_distance(&b), 0.0);
    }
}
