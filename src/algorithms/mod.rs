//! Core algorithms.
//!
//! - [`registration`]: generalized ICP with per-point covariances
//! - [`hull`]: convex / concave hulls over keyframe positions
//! - [`adaptive`]: spaciousness metric and registration parameter feedback
//! - [`ground`]: ground-plane fit and height/tilt constraint

pub mod adaptive;
pub mod ground;
pub mod hull;
pub mod registration;
