//! Unified configuration loading for Gati.
//!
//! Loads all configuration from a single TOML file with defaults for every
//! missing key.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gati::config::GatiConfig;
//!
//! // Load from default path (configs/gati.toml)
//! let config = GatiConfig::load_default()?;
//!
//! // Or use built-in defaults (no file needed)
//! let config = GatiConfig::default();
//!
//! config.validate()?;
//! let engine_config = config.odometry();
//! ```
//!
//! ## Configuration Sections
//!
//! | Section | Description |
//! |---------|-------------|
//! | `frames` | Frame names on transform events |
//! | `preprocessing` | Range gate, crop box, voxel filter |
//! | `detection` | Detection buffer and dynamic-object mask |
//! | `imu` | IMU use, calibration window, buffer, gravity alignment |
//! | `keyframe` | Distance/rotation thresholds |
//! | `submap` | kNN / convex / concave selection, alpha, voxel |
//! | `registration` | Minimum points, `s2s` and `s2m` GICP parameters |
//! | `adaptive` | Spaciousness smoothing and scaling breakpoints |
//! | `ground` | Ground constraint |
//! | `initial_pose` | Starting pose override |
//! | `threads` | Queue depths |
//!
//! ## Example TOML
//!
//! ```toml
//! [keyframe]
//! thresh_dist = 1.0       # meters
//! thresh_rot_deg = 15.0
//!
//! [registration.s2m]
//! max_correspondence_distance = 0.5
//! max_iterations = 32
//!
//! [ground]
//! enabled = true
//! threshold = -0.3        # sensor-frame z
//! ```

mod error;
mod gati;
mod sections;

pub use error::ConfigError;
pub use gati::GatiConfig;
pub use sections::{FramesConfig, ThreadsConfig};
