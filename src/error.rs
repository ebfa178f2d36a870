//! Fatal errors of the node and binary.
//!
//! Per-sweep problems are never errors here; they are reported as
//! [`Degradation`](crate::engine::odometry::Degradation) flags on each result.

use thiserror::Error;

use crate::config::ConfigError;
use crate::io::{RecordingError, TrajectoryError};

/// Gati error type
#[derive(Error, Debug)]
pub enum GatiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Trajectory export failed: {0}")]
    Trajectory(#[from] TrajectoryError),

    #[error("Recording replay failed: {0}")]
    Recording(#[from] RecordingError),

    #[error("Failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Worker thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, GatiError>;
