//! Worker threads.
//!
//! - `OdometryThread`: processes sweeps in arrival order and publishes results
//!
//! Inertial samples and detections do not go through a thread: producers
//! push them straight into the locked buffers owned by the node.

mod odometry_thread;

pub use odometry_thread::{OdometryEvent, OdometryThread, OdometryThreadConfig};
