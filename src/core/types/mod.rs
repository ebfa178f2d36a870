//! Core data types shared by every layer.

mod detection;
mod imu;
mod point_cloud;
mod pose;
mod timestamped;

pub use detection::{DetectionFrame, OrientedBox};
pub use imu::{ImuBias, ImuSample};
pub use point_cloud::PointCloud3D;
pub use pose::{Pose3D, Transform3D};
pub use timestamped::{Stamped, Timestamped};

/// One timestamped batch of range-sensor points.
pub type Sweep = Timestamped<PointCloud3D>;
