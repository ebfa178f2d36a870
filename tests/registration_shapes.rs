//! Registration Shape Tests
//!
//! Registers a synthetic cloud against a rigidly moved copy of itself and
//! checks that the known motion is recovered within 1% of its magnitude:
//! - Plane (only the normal offset and tilt are observable)
//! - Corner of three orthogonal planes
//! - Uniform random cloud
//!
//! Run with: `cargo test --test registration_shapes`

use nalgebra::{Point3, Translation3, Unit, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gati::{CovarianceCloud, Gicp, GicpConfig, Transform3D};

// ============================================================================
// Test Fixtures
// ============================================================================

fn config() -> GicpConfig {
    GicpConfig {
        max_correspondence_distance: 0.5,
        max_iterations: 100,
        transformation_epsilon: 1e-5,
        fitness_epsilon: 0.0,
        ..GicpConfig::sweep_to_sweep()
    }
}

fn motion(t: [f32; 3], axis: Vector3<f32>, angle_deg: f32) -> Transform3D {
    Transform3D::from_parts(
        Translation3::new(t[0], t[1], t[2]),
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle_deg.to_radians()),
    )
}

/// Square grid on z = 0 centered on the origin.
fn plane(half: f32, spacing: f32) -> Vec<Point3<f32>> {
    let n = (2.0 * half / spacing).round() as usize;
    let mut points = Vec::with_capacity((n + 1) * (n + 1));
    for i in 0..=n {
        for j in 0..=n {
            points.push(Point3::new(
                -half + i as f32 * spacing,
                -half + j as f32 * spacing,
                0.0,
            ));
        }
    }
    points
}

/// Three orthogonal 2m planes meeting at the origin.
fn corner(spacing: f32) -> Vec<Point3<f32>> {
    let n = (2.0 / spacing) as usize;
    let mut points = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let a = (i as f32 + 0.5) * spacing;
            let b = (j as f32 + 0.5) * spacing;
            points.push(Point3::new(a, b, 0.0));
            points.push(Point3::new(a, 0.0, b));
            points.push(Point3::new(0.0, a, b));
        }
    }
    points
}

fn random_cloud(n: usize, seed: u64) -> Vec<Point3<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        })
        .collect()
}

/// Align `offset · points` back onto `points`; returns `result · offset`,
/// which is the identity when the motion is fully recovered.
fn residual(points: Vec<Point3<f32>>, offset: &Transform3D, k: usize) -> Transform3D {
    let moved: Vec<Point3<f32>> = points.iter().map(|p| offset * p).collect();
    let target = CovarianceCloud::from_points(points, k);
    let source = CovarianceCloud::from_points(moved, k);
    let mut gicp = Gicp::new(config(), 50);

    let result = gicp
        .align(&source, &target, &Transform3D::identity())
        .unwrap();

    assert!(result.converged, "did not converge in {} iterations", result.iterations);
    result.transform * offset
}

fn assert_recovered(residual: &Transform3D, offset: &Transform3D) {
    let t_err = residual.translation.vector.norm();
    let r_err = residual.rotation.angle();
    assert!(
        t_err < 0.01 * offset.translation.vector.norm(),
        "translation error {t_err}"
    );
    assert!(r_err < 0.01 * offset.rotation.angle(), "rotation error {r_err}");
}

// ============================================================================
// Shapes
// ============================================================================

#[test]
fn test_plane_normal_motion() {
    let offset = motion([0.0, 0.0, 0.1], Vector3::x(), 2.0);
    let residual = residual(plane(1.0, 0.05), &offset, 10);

    // In-plane slide and yaw are unobservable; height and tilt are not
    let tilt = (residual.rotation * Vector3::z()).angle(&Vector3::z());
    assert!(residual.translation.vector.z.abs() < 0.01 * 0.1);
    assert!(tilt < 0.01 * 2f32.to_radians());
}

#[test]
fn test_corner_motion() {
    let offset = motion([0.1, -0.05, 0.08], Vector3::new(0.2, 0.3, 1.0), 3.0);
    let residual = residual(corner(0.05), &offset, 10);
    assert_recovered(&residual, &offset);
}

#[test]
fn test_random_cloud_motion() {
    let offset = motion([0.03, -0.02, 0.02], Vector3::new(1.0, -0.5, 0.3), 1.0);
    let residual = residual(random_cloud(3000, 7), &offset, 10);
    assert_recovered(&residual, &offset);
}

#[test]
fn test_aligned_cloud_is_identity() {
    let points = corner(0.1);
    let cloud = CovarianceCloud::from_points(points, 10);
    let mut gicp = Gicp::new(config(), 50);

    let result = gicp
        .align(&cloud, &cloud, &Transform3D::identity())
        .unwrap();

    assert!(result.converged);
    assert!(result.iterations <= 1);
    assert!(result.transform.translation.vector.norm() < 1e-5);
    assert!(result.transform.rotation.angle() < 1e-5);
}
