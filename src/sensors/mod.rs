//! Sensor processing layer.
//!
//! # Contents
//!
//! - [`preprocessing`]: sweep filtering and dynamic-object masking
//! - [`imu`]: inertial buffering, bias calibration and rotation prediction

pub mod imu;
pub mod preprocessing;
