//! Gati - LiDAR-inertial odometry core
//!
//! Estimates a 6-DoF pose per range-sensor sweep by chaining an IMU-primed
//! sweep-to-sweep GICP with a sweep-to-submap GICP against adaptively
//! selected keyframes, then optionally constraining height and tilt with a
//! fitted ground plane.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 main / node                         │  ← Delivery surface
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │              threads/, state/, io/                  │  ← Infrastructure
//! │     (odometry worker, snapshot, TUM, replay)        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │          (keyframes, submap, per-sweep update)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │      (registration, hull, adaptive, ground)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensors/                          │  ← Sensor processing
//! │        (preprocessing, masking, inertial)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │             (types, buffer, math)                   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gati::{GatiConfig, OdometryNode};
//!
//! let config = GatiConfig::load_default()?;
//! let node = OdometryNode::new(&config)?;
//!
//! node.push_imu(sample);
//! node.submit_sweep(sweep);
//!
//! let snapshot = node.finish()?;
//! println!("{} poses", snapshot.trajectory.len());
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Sensor processing (depends on core)
// ============================================================================
pub mod sensors;

// ============================================================================
// Layer 3: Algorithms (depends on core)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 4: Odometry engine (depends on core, sensors, algorithms)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 5: Infrastructure (depends on all layers)
// ============================================================================
pub mod config;
pub mod error;
pub mod io;
pub mod node;
pub mod state;
pub mod threads;
pub mod utils;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::types::{
    DetectionFrame, ImuSample, OrientedBox, PointCloud3D, Pose3D, Sweep, Timestamped,
    Transform3D,
};

// Algorithms
pub use algorithms::registration::{
    CovarianceCloud, Gicp, GicpConfig, RegistrationConfig, RegistrationError, RegistrationResult,
};

// Engine
pub use engine::odometry::{
    Degradation, KeyframeInfo, OdometryConfig, OdometryEngine, OdometryResult, OdometryStatus,
};

// Infrastructure
pub use config::{ConfigError, GatiConfig};
pub use error::GatiError;
pub use node::OdometryNode;
pub use state::OdometrySnapshot;
pub use threads::OdometryEvent;
