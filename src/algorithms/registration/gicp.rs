//! Generalized ICP (plane-to-plane) registration.
//!
//! # Algorithm
//!
//! ```text
//! Input: source S with covariances Cs, target T with covariances Ct, guess X₀
//! Output: X* aligning S onto T
//!
//! For each iteration:
//!   1. p = X·sᵢ, match the nearest tⱼ within the max correspondence distance
//!   2. prune matches with RANSAC (point-to-plane inlier threshold)
//!   3. eᵢ = tⱼ − p,   Mᵢ = (Ctⱼ + R·Csᵢ·Rᵀ)⁻¹
//!      Jᵢ = [ [p]ₓ  −I ]  (left perturbation ξ = [ω, v])
//!   4. solve (Σ JᵀMJ) ξ = −Σ JᵀMe
//!   5. X ← exp(ξ)·X
//!   6. stop when |ω|, |v| < ε_transform or the fitness stops changing
//! ```
//!
//! Correspondence search and the normal-equation accumulation run in
//! parallel over source points.

use nalgebra::{Matrix3, Matrix3x6, Matrix6, Point3, Translation3, UnitQuaternion, Vector3, Vector6};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use super::config::GicpConfig;
use super::covariance::CovarianceCloud;
use super::ransac::{CorrespondencePair, prune_outliers};
use super::{RegistrationError, RegistrationResult};
use crate::core::math::skew;
use crate::core::types::Transform3D;

/// Fewest correspondences for a well-posed 6-DoF update.
const MIN_CORRESPONDENCES: usize = 6;

/// Seed for the RANSAC sampler, so repeated runs give identical poses.
const RANSAC_SEED: u64 = 0x6761_7469;

#[derive(Debug, Clone, Copy)]
struct Correspondence {
    source: usize,
    target: usize,
    distance_sq: f32,
}

/// GICP registrar for one stage.
#[derive(Debug, Clone)]
pub struct Gicp {
    config: GicpConfig,
    min_points: usize,
    rng: StdRng,
}

impl Gicp {
    /// Create a registrar.
    ///
    /// `min_points` is the smallest source or target size that will be aligned.
    pub fn new(config: GicpConfig, min_points: usize) -> Self {
        Self {
            config,
            min_points,
            rng: StdRng::seed_from_u64(RANSAC_SEED),
        }
    }

    /// Get configuration.
    pub fn config(&self) -> &GicpConfig {
        &self.config
    }

    /// Replace the configuration (used by the adaptive controller).
    pub fn set_config(&mut self, config: GicpConfig) {
        self.config = config;
    }

    /// Align `source` onto `target` starting from `initial_guess`.
    ///
    /// Returns [`RegistrationError::InsufficientPoints`] when either cloud is
    /// smaller than the configured minimum. Exhausting the iteration budget
    /// is not an error: the best transform found is returned with
    /// `converged == false`.
    pub fn align(
        &mut self,
        source: &CovarianceCloud,
        target: &CovarianceCloud,
        initial_guess: &Transform3D,
    ) -> Result<RegistrationResult, RegistrationError> {
        if source.len() < self.min_points || target.len() < self.min_points {
            return Err(RegistrationError::InsufficientPoints {
                source_points: source.len(),
                target_points: target.len(),
                min: self.min_points,
            });
        }

        let max_dist_sq = self.config.max_correspondence_distance.powi(2);
        let mut transform = *initial_guess;
        let mut best = (f32::MAX, transform);
        let mut last_fitness: Option<f32> = None;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            let correspondences = find_correspondences(source, target, &transform, max_dist_sq);
            if correspondences.len() < MIN_CORRESPONDENCES {
                log::debug!(
                    "GICP: only {} correspondences within {:.2}m",
                    correspondences.len(),
                    self.config.max_correspondence_distance
                );
                break;
            }

            let fitness = mean_distance_sq(&correspondences);
            if fitness < best.0 {
                best = (fitness, transform);
            }
            if let Some(last) = last_fitness
                && (last - fitness).abs() < self.config.fitness_epsilon
            {
                converged = true;
                break;
            }
            last_fitness = Some(fitness);

            let inliers = self.prune(source, target, &transform, &correspondences);
            let Some(xi) = solve_update(source, target, &transform, &correspondences, &inliers)
            else {
                log::debug!("GICP: degenerate normal equations");
                break;
            };

            let omega = Vector3::new(xi[0], xi[1], xi[2]).cast::<f32>();
            let v = Vector3::new(xi[3], xi[4], xi[5]).cast::<f32>();
            let delta = Transform3D::from_parts(
                Translation3::from(v),
                UnitQuaternion::from_scaled_axis(omega),
            );
            transform = delta * transform;
            iterations += 1;

            if omega.norm() < self.config.transformation_epsilon
                && v.norm() < self.config.transformation_epsilon
            {
                converged = true;
                break;
            }
        }

        let final_matches = find_correspondences(source, target, &transform, max_dist_sq);
        let mut fitness = if final_matches.is_empty() {
            f32::MAX
        } else {
            mean_distance_sq(&final_matches)
        };

        if !converged && best.0 < fitness {
            fitness = best.0;
            transform = best.1;
        }

        Ok(RegistrationResult {
            transform,
            fitness,
            iterations,
            converged,
            correspondences: final_matches.len(),
        })
    }

    fn prune(
        &mut self,
        source: &CovarianceCloud,
        target: &CovarianceCloud,
        transform: &Transform3D,
        correspondences: &[Correspondence],
    ) -> Vec<bool> {
        if self.config.ransac_iterations == 0 {
            return vec![true; correspondences.len()];
        }
        let pairs: Vec<CorrespondencePair> = correspondences
            .iter()
            .map(|c| CorrespondencePair {
                source: transform * source.points()[c.source],
                target: target.points()[c.target],
                normal: target.normals()[c.target],
            })
            .collect();
        prune_outliers(
            &pairs,
            self.config.ransac_iterations,
            self.config.ransac_inlier_threshold,
            &mut self.rng,
        )
    }
}

fn find_correspondences(
    source: &CovarianceCloud,
    target: &CovarianceCloud,
    transform: &Transform3D,
    max_dist_sq: f32,
) -> Vec<Correspondence> {
    source
        .points()
        .par_iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let p: Point3<f32> = transform * s;
            let (j, d2) = target.nearest(&p)?;
            (d2 <= max_dist_sq).then_some(Correspondence {
                source: i,
                target: j,
                distance_sq: d2,
            })
        })
        .collect()
}

fn mean_distance_sq(correspondences: &[Correspondence]) -> f32 {
    let sum: f64 = correspondences.iter().map(|c| c.distance_sq as f64).sum();
    (sum / correspondences.len() as f64) as f32
}

/// Gauss-Newton step ξ = [ω, v] for the current correspondences.
fn solve_update(
    source: &CovarianceCloud,
    target: &CovarianceCloud,
    transform: &Transform3D,
    correspondences: &[Correspondence],
    inliers: &[bool],
) -> Option<Vector6<f64>> {
    let r: Matrix3<f64> = transform.rotation.to_rotation_matrix().into_inner().cast();
    let rt = r.transpose();

    let (h, g, used) = correspondences
        .par_iter()
        .zip(inliers.par_iter())
        .filter(|(_, inlier)| **inlier)
        .filter_map(|(c, _)| {
            let p = (transform * source.points()[c.source]).coords.cast::<f64>();
            let q = target.points()[c.target].coords.cast::<f64>();
            let e = q - p;

            let cs: Matrix3<f64> = source.covariances()[c.source].cast();
            let ct: Matrix3<f64> = target.covariances()[c.target].cast();
            let m = (ct + r * cs * rt).try_inverse()?;

            let mut j = Matrix3x6::<f64>::zeros();
            j.fixed_view_mut::<3, 3>(0, 0).copy_from(&skew(&p));
            j.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-Matrix3::identity()));

            let jtm = j.transpose() * m;
            Some((jtm * j, jtm * e, 1usize))
        })
        .reduce(
            || (Matrix6::zeros(), Vector6::zeros(), 0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        );

    if used < MIN_CORRESPONDENCES {
        return None;
    }

    let rhs = -g;
    match h.cholesky() {
        Some(chol) => Some(chol.solve(&rhs)),
        None => h.lu().solve(&rhs),
    }
}
