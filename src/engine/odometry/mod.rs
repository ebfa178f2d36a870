//! LiDAR-inertial odometry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     PER-SWEEP UPDATE                          │
//! │                                                               │
//! │  Sweep → Preprocess → Mask ──▶ Covariances                    │
//! │                                    │                          │
//! │        IMU prior (t_prev, t] ──▶ Sweep-to-sweep               │
//! │                                    │  T_rel                   │
//! │                                    ▼                          │
//! │               predicted = pose_prev · T_rel                   │
//! │                                    │                          │
//! │     Keyframes ─▶ Submap select (kNN ∪ convex ∪ concave)       │
//! │                                    │                          │
//! │                                    ▼                          │
//! │                          Sweep-to-submap                      │
//! │                                    │                          │
//! │                          Ground constraint                    │
//! │                                    │                          │
//! │            Commit pose ─▶ Keyframe decision ─▶ Adaptive        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`KeyframeManager`]: decides when a corrected pose becomes a keyframe
//! - [`SubmapBuilder`]: selects keyframes and assembles the local submap
//! - [`OdometryEngine`]: sequences everything for one sweep
//! - [`OdometryStatus`]: degradations raised while doing so
//!
//! # Example
//!
//! ```ignore
//! use gati::engine::odometry::{OdometryConfig, OdometryEngine};
//!
//! let mut engine = OdometryEngine::standalone(OdometryConfig::default());
//! engine.imu().push(sample);
//!
//! let result = engine.process_sweep(&sweep);
//! println!("Pose: {:?} ({})", result.pose, result.status);
//! ```

mod keyframe;
mod odometry_engine;
mod status;
mod submap;

pub use keyframe::{Keyframe, KeyframeConfig, KeyframeManager, KeyframeState};
pub use odometry_engine::{InitialPoseConfig, OdometryConfig, OdometryEngine};
pub use status::{Degradation, KeyframeInfo, OdometryResult, OdometryStatus, TimingBreakdown};
pub use submap::{
    Submap, SubmapBuilder, SubmapConfig, select_concave, select_convex, select_keyframes,
    select_knn,
};
