//! Odometry orchestration layer.
//!
//! This layer coordinates the sensor and algorithm layers into the
//! per-sweep odometry update.
//!
//! # Contents
//!
//! - [`odometry`]: keyframes, submap selection and the odometry engine

pub mod odometry;
