//! Adaptive registration parameters.
//!
//! Open scenes need a wider correspondence gate and more iterations to absorb
//! large displacements; cluttered scenes need a tight gate to avoid matching
//! across nearby surfaces. The scene is summarised by its *spaciousness*
//! (median nearest-neighbour distance of the sweep), smoothed over a short
//! history, and mapped through a piecewise-linear factor:
//!
//! ```text
//! factor
//!   2.0 |                    ________
//!       |                  /
//!   1.0 |          ______/
//!   0.5 |  ______/
//!       +--------------------------- spaciousness (m)
//!           0.1    0.25  0.5    1.0
//! ```
//!
//! [`adapt`] is a pure function of the base parameters and the smoothed
//! metric, so one cycle's parameters can be reproduced without the engine.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::registration::{CovarianceCloud, GicpConfig};
use crate::core::math::{mean, median};

/// How the spaciousness history is reduced to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    #[default]
    Median,
    Mean,
}

/// One `(spaciousness, factor)` knot of the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Smoothed spaciousness (meters)
    pub spaciousness: f32,
    /// Multiplier applied to the base parameters
    pub factor: f32,
}

impl Breakpoint {
    pub const fn new(spaciousness: f32, factor: f32) -> Self {
        Self {
            spaciousness,
            factor,
        }
    }
}

/// Adaptive controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// When false the configured registration parameters are used unchanged.
    pub enabled: bool,

    /// History reduction.
    pub smoothing: Smoothing,

    /// Number of recent sweeps kept in the history.
    pub history_len: usize,

    /// Mapping knots, non-decreasing in both coordinates.
    pub breakpoints: Vec<Breakpoint>,

    /// Lower bound on the adapted iteration budget.
    pub min_iterations: u32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smoothing: Smoothing::Median,
            history_len: 10,
            breakpoints: vec![
                Breakpoint::new(0.1, 0.5),
                Breakpoint::new(0.25, 1.0),
                Breakpoint::new(0.5, 1.0),
                Breakpoint::new(1.0, 2.0),
            ],
            min_iterations: 8,
        }
    }
}

impl AdaptiveConfig {
    /// Whether the knots are non-decreasing in spaciousness and factor.
    pub fn is_monotone(&self) -> bool {
        self.breakpoints.windows(2).all(|w| {
            w[0].spaciousness <= w[1].spaciousness && w[0].factor <= w[1].factor
        })
    }
}

/// Spaciousness of one sweep: median distance from each point to its
/// nearest neighbour. `None` for clouds without neighbour distances.
pub fn spaciousness(cloud: &CovarianceCloud) -> Option<f32> {
    let mut distances = cloud.nn_distances().to_vec();
    median(&mut distances)
}

/// Piecewise-linear factor for a smoothed spaciousness, clamped at the ends.
pub fn scale_factor(breakpoints: &[Breakpoint], spaciousness: f32) -> f32 {
    let (Some(first), Some(last)) = (breakpoints.first(), breakpoints.last()) else {
        return 1.0;
    };
    if spaciousness <= first.spaciousness {
        return first.factor;
    }
    if spaciousness >= last.spaciousness {
        return last.factor;
    }

    for w in breakpoints.windows(2) {
        let (a, b) = (w[0], w[1]);
        if spaciousness <= b.spaciousness {
            let span = b.spaciousness - a.spaciousness;
            if span <= f32::EPSILON {
                return b.factor;
            }
            let t = (spaciousness - a.spaciousness) / span;
            return a.factor + t * (b.factor - a.factor);
        }
    }
    last.factor
}

/// Registration parameters for the next cycle.
///
/// Only the correspondence gate and the iteration budget are scaled; every
/// other field keeps its base value.
pub fn adapt(base: &GicpConfig, smoothed: f32, config: &AdaptiveConfig) -> GicpConfig {
    let factor = scale_factor(&config.breakpoints, smoothed);
    let iterations = (base.max_iterations as f32 * factor).round() as u32;
    GicpConfig {
        max_correspondence_distance: base.max_correspondence_distance * factor,
        max_iterations: iterations.max(config.min_iterations),
        ..*base
    }
}

/// Keeps the spaciousness history and produces per-cycle parameters.
#[derive(Debug, Clone)]
pub struct AdaptiveController {
    config: AdaptiveConfig,
    history: VecDeque<f32>,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig) -> Self {
        let capacity = config.history_len.max(1);
        Self {
            config,
            history: VecDeque::with_capacity(capacity),
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Append one sweep's spaciousness, evicting the oldest value.
    pub fn record(&mut self, value: f32) {
        if !value.is_finite() {
            return;
        }
        if self.history.len() >= self.config.history_len.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }

    /// Smoothed spaciousness over the history.
    pub fn smoothed(&self) -> Option<f32> {
        let mut values: Vec<f32> = self.history.iter().copied().collect();
        match self.config.smoothing {
            Smoothing::Median => median(&mut values),
            Smoothing::Mean => mean(&values),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Parameters for the next sweep-to-sweep and sweep-to-submap alignments.
    ///
    /// Returns the base values when disabled or before any history exists.
    pub fn next_params(&self, s2s: &GicpConfig, s2m: &GicpConfig) -> (GicpConfig, GicpConfig) {
        if !self.config.enabled {
            return (*s2s, *s2m);
        }
        match self.smoothed() {
            Some(s) => (adapt(s2s, s, &self.config), adapt(s2m, s, &self.config)),
            None => (*s2s, *s2m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<Point3<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_spaciousness_grows_with_scale() {
        let points = random_points(500, 7);
        let base = spaciousness(&CovarianceCloud::from_points(points.clone(), 5)).unwrap();

        for scale in [1.5f32, 2.0, 4.0] {
            let scaled: Vec<_> = points.iter().map(|p| Point3::from(p.coords * scale)).collect();
            let s = spaciousness(&CovarianceCloud::from_points(scaled, 5)).unwrap();
            assert!(s >= base, "scale {scale}: {s} < {base}");
            assert_relative_eq!(s, base * scale, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_scale_factor_interpolates_and_clamps() {
        let knots = AdaptiveConfig::default().breakpoints;
        assert_relative_eq!(scale_factor(&knots, 0.0), 0.5);
        assert_relative_eq!(scale_factor(&knots, 0.175), 0.75, epsilon = 1e-5);
        assert_relative_eq!(scale_factor(&knots, 0.4), 1.0);
        assert_relative_eq!(scale_factor(&knots, 0.75), 1.5, epsilon = 1e-5);
        assert_relative_eq!(scale_factor(&knots, 50.0), 2.0);
        assert_relative_eq!(scale_factor(&[], 0.3), 1.0);
    }

    #[test]
    fn test_adapt_scales_gate_and_budget() {
        let config = AdaptiveConfig::default();
        let base = GicpConfig::sweep_to_sweep();

        let open = adapt(&base, 2.0, &config);
        assert_relative_eq!(open.max_correspondence_distance, 2.0, epsilon = 1e-5);
        assert_eq!(open.max_iterations, 64);

        let cluttered = adapt(&base, 0.05, &config);
        assert_relative_eq!(cluttered.max_correspondence_distance, 0.5, epsilon = 1e-5);
        assert_eq!(cluttered.max_iterations, 16);
        assert_eq!(cluttered.k_correspondences, base.k_correspondences);
        assert_eq!(cluttered.ransac_iterations, base.ransac_iterations);
    }

    #[test]
    fn test_adapt_respects_min_iterations() {
        let config = AdaptiveConfig {
            min_iterations: 20,
            ..AdaptiveConfig::default()
        };
        let base = GicpConfig::sweep_to_sweep();
        assert_eq!(adapt(&base, 0.0, &config).max_iterations, 20);
    }

    #[test]
    fn test_history_is_bounded_and_median_smoothed() {
        let mut controller = AdaptiveController::new(AdaptiveConfig {
            history_len: 3,
            ..AdaptiveConfig::default()
        });
        assert_eq!(controller.smoothed(), None);

        for v in [10.0, 0.2, 0.3, 0.4] {
            controller.record(v);
        }
        // 10.0 evicted
        assert_eq!(controller.history_len(), 3);
        assert_relative_eq!(controller.smoothed().unwrap(), 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_mean_smoothing() {
        let mut controller = AdaptiveController::new(AdaptiveConfig {
            smoothing: Smoothing::Mean,
            ..AdaptiveConfig::default()
        });
        controller.record(0.2);
        controller.record(0.4);
        assert_relative_eq!(controller.smoothed().unwrap(), 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_disabled_returns_base() {
        let mut controller = AdaptiveController::new(AdaptiveConfig {
            enabled: false,
            ..AdaptiveConfig::default()
        });
        controller.record(5.0);
        let s2s = GicpConfig::sweep_to_sweep();
        let s2m = GicpConfig::sweep_to_submap();

        let (a, b) = controller.next_params(&s2s, &s2m);
        assert_eq!(a, s2s);
        assert_eq!(b, s2m);
    }

    #[test]
    fn test_monotone_check() {
        assert!(AdaptiveConfig::default().is_monotone());
        let bad = AdaptiveConfig {
            breakpoints: vec![Breakpoint::new(0.5, 1.0), Breakpoint::new(0.2, 2.0)],
            ..AdaptiveConfig::default()
        };
        assert!(!bad.is_monotone());
    }
}
