//! RANSAC pruning of correspondence sets.
//!
//! Hypotheses are rigid transforms fitted to three random correspondences
//! (Kabsch). Each hypothesis is scored by how many correspondences it brings
//! within the inlier threshold, measured point-to-plane along the target
//! normal. The current estimate (identity correction) is always scored
//! first, so pruning never keeps fewer inliers than a plain distance gate.

use nalgebra::{Isometry3, Matrix3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::Rng;

/// One correspondence as seen by the pruner.
#[derive(Debug, Clone, Copy)]
pub struct CorrespondencePair {
    /// Source point under the current estimate
    pub source: Point3<f32>,
    /// Matched target point
    pub target: Point3<f32>,
    /// Target surface normal (zero if unknown)
    pub normal: Vector3<f32>,
}

impl CorrespondencePair {
    #[inline]
    fn residual(&self, hypothesis: &Isometry3<f32>) -> f32 {
        let d = self.target - hypothesis * self.source;
        if self.normal == Vector3::zeros() {
            d.norm()
        } else {
            self.normal.dot(&d).abs()
        }
    }
}

/// Inlier mask of the best hypothesis.
///
/// Returns all-true when there are fewer than three pairs, when pruning is
/// disabled, or when no hypothesis keeps at least three inliers.
pub fn prune_outliers<R: Rng>(
    pairs: &[CorrespondencePair],
    iterations: u32,
    threshold: f32,
    rng: &mut R,
) -> Vec<bool> {
    if iterations == 0 || pairs.len() < 3 {
        return vec![true; pairs.len()];
    }

    let count = |h: &Isometry3<f32>| pairs.iter().filter(|p| p.residual(h) < threshold).count();

    let mut best = Isometry3::identity();
    let mut best_count = count(&best);

    for _ in 0..iterations {
        let Some(sample) = sample_three(pairs.len(), rng) else {
            break;
        };
        let src = sample.map(|i| pairs[i].source);
        let tgt = sample.map(|i| pairs[i].target);
        let Some(hypothesis) = kabsch(&src, &tgt) else {
            continue;
        };
        let c = count(&hypothesis);
        if c > best_count {
            best_count = c;
            best = hypothesis;
        }
    }

    if best_count < 3 {
        return vec![true; pairs.len()];
    }

    pairs.iter().map(|p| p.residual(&best) < threshold).collect()
}

fn sample_three<R: Rng>(n: usize, rng: &mut R) -> Option<[usize; 3]> {
    if n < 3 {
        return None;
    }
    let a = rng.gen_range(0..n);
    let mut b = rng.gen_range(0..n - 1);
    if b >= a {
        b += 1;
    }
    let mut c = rng.gen_range(0..n - 2);
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    if c >= lo {
        c += 1;
    }
    if c >= hi {
        c += 1;
    }
    Some([a, b, c])
}

/// Least-squares rigid transform mapping `src` onto `tgt`.
pub fn kabsch(src: &[Point3<f32>], tgt: &[Point3<f32>]) -> Option<Isometry3<f32>> {
    if src.len() != tgt.len() || src.is_empty() {
        return None;
    }
    let n = src.len() as f32;
    let src_c = src.iter().map(|p| p.coords).sum::<Vector3<f32>>() / n;
    let tgt_c = tgt.iter().map(|p| p.coords).sum::<Vector3<f32>>() / n;

    let mut h = Matrix3::zeros();
    for (s, t) in src.iter().zip(tgt) {
        h += (s.coords - src_c) * (t.coords - tgt_c).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();
    let d = (v * u.transpose()).determinant().signum();
    let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d));
    let r = v * correction * u.transpose();

    let rotation = UnitQuaternion::from_matrix(&r);
    let translation = tgt_c - rotation * src_c;
    Some(Isometry3::from_parts(Translation3::from(translation), rotation))
}
