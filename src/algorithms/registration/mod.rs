//! Point cloud registration.
//!
//! Both odometry stages (sweep-to-sweep and sweep-to-submap) use the same
//! plane-to-plane GICP solver with different parameter sets.
//!
//! # Components
//!
//! - [`CovarianceCloud`]: points with per-point covariances and an R-tree index
//! - [`Gicp`]: Gauss-Newton GICP with RANSAC correspondence pruning
//! - [`GicpConfig`]: per-stage parameters
//!
//! # Example
//!
//! ```ignore
//! use gati::algorithms::registration::{CovarianceCloud, Gicp, GicpConfig};
//!
//! let source = CovarianceCloud::from_cloud(&current, 10);
//! let target = CovarianceCloud::from_cloud(&previous, 10);
//!
//! let mut gicp = Gicp::new(GicpConfig::sweep_to_sweep(), 100);
//! let result = gicp.align(&source, &target, &prior)?;
//! if result.converged {
//!     println!("Transform: {:?}", result.transform);
//! }
//! ```

mod config;
mod covariance;
mod gicp;
mod ransac;

pub use config::{GicpConfig, RegistrationConfig};
pub use covariance::{CovarianceCloud, IndexedPoint, PLANE_EPSILON};
pub use gicp::Gicp;
pub use ransac::{CorrespondencePair, kabsch, prune_outliers};

use thiserror::Error;

use crate::core::types::Transform3D;

/// Result of one alignment.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationResult {
    /// Transform taking source points onto the target.
    pub transform: Transform3D,

    /// Mean squared nearest-neighbour distance of the final correspondences (m²).
    pub fitness: f32,

    /// Gauss-Newton updates applied.
    pub iterations: u32,

    /// Whether a convergence criterion was met inside the iteration budget.
    pub converged: bool,

    /// Correspondences within the gate at the returned transform.
    pub correspondences: usize,
}

/// Registration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("not enough points to register (source {source_points}, target {target_points}, need {min})")]
    InsufficientPoints {
        source_points: usize,
        target_points: usize,
        min: usize,
    },
}
