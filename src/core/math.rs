//! Small numeric helpers shared by the registration and estimation code.

use nalgebra::{Matrix3, Vector3};

/// Skew-symmetric matrix such that `skew(a) * b == a.cross(&b)`.
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Median of a slice (reorders the slice). Returns `None` when empty.
///
/// For even lengths the mean of the two middle values is returned.
pub fn median(values: &mut [f32]) -> Option<f32> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        Some(upper)
    } else {
        let lower_max = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Some(0.5 * (lower_max + upper))
    }
}

/// Arithmetic mean. Returns `None` when empty.
pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

/// Eigenvector of a symmetric 3x3 matrix belonging to its smallest eigenvalue.
pub fn smallest_eigenvector(m: &Matrix3<f32>) -> (Vector3<f32>, f32) {
    let eig = m.symmetric_eigen();
    let mut idx = 0;
    for i in 1..3 {
        if eig.eigenvalues[i] < eig.eigenvalues[idx] {
            idx = i;
        }
    }
    (
        eig.eigenvectors.column(idx).into_owned(),
        eig.eigenvalues[idx],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_matches_cross() {
        let a = Vector3::new(1.0, -2.0, 0.5);
        let b = Vector3::new(0.3, 0.7, -1.1);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-12);
    }

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_smallest_eigenvector_of_plane_covariance() {
        let m = Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, 0.01));
        let (v, value) = smallest_eigenvector(&m);
        assert_relative_eq!(v.z.abs(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(value, 0.01, epsilon = 1e-6);
    }
}
