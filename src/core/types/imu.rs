//! Inertial measurement types.

use nalgebra::Vector3;

use super::timestamped::Stamped;

/// One inertial sample on the sensor clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Timestamp in microseconds
    pub timestamp_us: u64,
    /// Angular velocity in rad/s (sensor frame)
    pub angular_velocity: Vector3<f32>,
    /// Specific force in m/s² (sensor frame, includes gravity)
    pub linear_acceleration: Vector3<f32>,
}

impl ImuSample {
    /// Create a new sample.
    pub fn new(
        timestamp_us: u64,
        angular_velocity: Vector3<f32>,
        linear_acceleration: Vector3<f32>,
    ) -> Self {
        Self {
            timestamp_us,
            angular_velocity,
            linear_acceleration,
        }
    }

    /// Sample with bias removed.
    #[inline]
    pub fn corrected(&self, bias: &ImuBias) -> ImuSample {
        ImuSample {
            timestamp_us: self.timestamp_us,
            angular_velocity: self.angular_velocity - bias.gyro,
            linear_acceleration: self.linear_acceleration - bias.accel,
        }
    }
}

impl Stamped for ImuSample {
    #[inline]
    fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }
}

/// Additive gyroscope and accelerometer offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuBias {
    /// Gyroscope bias (rad/s)
    pub gyro: Vector3<f32>,
    /// Accelerometer bias (m/s²), gravity excluded
    pub accel: Vector3<f32>,
}

impl ImuBias {
    /// Zero bias.
    pub fn zero() -> Self {
        Self {
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
        }
    }
}

impl Default for ImuBias {
    fn default() -> Self {
        Self::zero()
    }
}
