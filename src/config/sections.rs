//! Sections that configure the node rather than a single component.

use serde::{Deserialize, Serialize};

/// Frame names attached to transform events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// Fixed reference frame
    pub odom_frame: String,
    /// Sensor/body frame
    pub child_frame: String,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            odom_frame: "odom".into(),
            child_frame: "base_link".into(),
        }
    }
}

/// Queue sizes between producers and the odometry thread.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    /// Sweeps waiting for processing; newer sweeps are dropped when full.
    pub sweep_queue: usize,
    /// Undelivered output events; newer events are dropped when full.
    pub event_queue: usize,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            sweep_queue: 2,
            event_queue: 256,
        }
    }
}
