//! Inertial processing.
//!
//! - [`BiasCalibrator`]: stationary-window bias and gravity estimate
//! - [`InertialIntegrator`]: locked sample buffer and gyro integration between sweeps

mod calibration;
mod integrator;

pub use calibration::{BiasCalibrator, CalibrationResult, STANDARD_GRAVITY};
pub use integrator::{ImuConfig, InertialIntegrator, RotationPrior};
