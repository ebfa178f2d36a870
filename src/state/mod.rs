//! Shared odometry state.
//!
//! The sweep worker is the only writer; any other thread reads through
//! [`SharedOdometryHandle`] and should copy what it needs out of the lock.

mod shared;

pub use shared::{OdometrySnapshot, SharedOdometryHandle, create_shared_odometry};
