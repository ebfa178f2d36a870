//! I/O layer.
//!
//! # Contents
//!
//! - [`trajectory`]: TUM trajectory export
//! - [`recording`]: line-based sensor recording replay

pub mod recording;
pub mod trajectory;

pub use recording::{RecordEvent, RecordingError, RecordingReader, load_xyz};
pub use trajectory::{TrajectoryError, read_tum, write_tum, write_tum_to};
