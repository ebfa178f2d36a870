//! IMU bias calibration over a stationary start-up window.
//!
//! Samples are averaged until the window (measured on the IMU clock from the
//! first sample) has elapsed. The gyro bias is the mean angular velocity.
//! The mean specific force gives the gravity direction; the accelerometer
//! bias is what remains after removing standard gravity along it.

use nalgebra::Vector3;

use crate::core::types::{ImuBias, ImuSample};

/// Standard gravity (m/s²).
pub const STANDARD_GRAVITY: f32 = 9.80665;

/// Outcome of a completed calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    /// Estimated additive bias.
    pub bias: ImuBias,
    /// Mean raw specific force over the window, if any sample was collected.
    pub mean_specific_force: Option<Vector3<f32>>,
    /// Number of samples averaged.
    pub sample_count: usize,
}

/// Estimates gyro and accelerometer bias from stationary samples.
///
/// # Usage
///
/// 1. Create a calibrator with the window length
/// 2. Feed samples with `add_sample()` until it returns `true`
/// 3. Read the result with `result()`
#[derive(Debug, Clone)]
pub struct BiasCalibrator {
    window_us: u64,
    first_us: Option<u64>,
    gyro_sum: Vector3<f64>,
    accel_sum: Vector3<f64>,
    count: usize,
    result: Option<CalibrationResult>,
}

impl BiasCalibrator {
    /// Create a calibrator averaging over `window_secs` of IMU time.
    pub fn new(window_secs: f32) -> Self {
        Self {
            window_us: (window_secs.max(0.0) as f64 * 1e6) as u64,
            first_us: None,
            gyro_sum: Vector3::zeros(),
            accel_sum: Vector3::zeros(),
            count: 0,
            result: None,
        }
    }

    /// Add a sample. Returns `true` once calibration is complete.
    ///
    /// The first sample at or past the end of the window completes the
    /// calibration and is not included in the average.
    pub fn add_sample(&mut self, sample: &ImuSample) -> bool {
        if self.result.is_some() {
            return true;
        }

        let first = *self.first_us.get_or_insert(sample.timestamp_us);
        if sample.timestamp_us.saturating_sub(first) < self.window_us {
            self.gyro_sum += sample.angular_velocity.cast::<f64>();
            self.accel_sum += sample.linear_acceleration.cast::<f64>();
            self.count += 1;
            return false;
        }

        self.result = Some(self.finish());
        true
    }

    fn finish(&self) -> CalibrationResult {
        if self.count == 0 {
            return CalibrationResult {
                bias: ImuBias::zero(),
                mean_specific_force: None,
                sample_count: 0,
            };
        }

        let n = self.count as f64;
        let gyro = (self.gyro_sum / n).cast::<f32>();
        let accel_mean = (self.accel_sum / n).cast::<f32>();
        let accel = match accel_mean.try_normalize(1e-6) {
            Some(dir) => accel_mean - dir * STANDARD_GRAVITY,
            None => Vector3::zeros(),
        };

        CalibrationResult {
            bias: ImuBias { gyro, accel },
            mean_specific_force: Some(accel_mean),
            sample_count: self.count,
        }
    }

    /// Check if calibration is complete.
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Number of samples collected so far.
    pub fn sample_count(&self) -> usize {
        self.count
    }

    /// Calibration result, once complete.
    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref()
    }

    /// Discard collected samples and start over.
    pub fn reset(&mut self) {
        self.first_us = None;
        self.gyro_sum = Vector3::zeros();
        self.accel_sum = Vector3::zeros();
        self.count = 0;
        self.result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(t_us: u64, gyro: [f32; 3], accel: [f32; 3]) -> ImuSample {
        ImuSample::new(t_us, Vector3::from(gyro), Vector3::from(accel))
    }

    #[test]
    fn test_bias_is_window_mean() {
        let mut cal = BiasCalibrator::new(1.0);
        // 100 Hz for 1 s: gyro alternates around 0.02 on z
        for i in 0..100u64 {
            let wz = if i % 2 == 0 { 0.01 } else { 0.03 };
            assert!(!cal.add_sample(&sample(i * 10_000, [0.0, 0.0, wz], [0.0, 0.0, 9.9])));
        }
        assert!(cal.add_sample(&sample(1_000_000, [5.0, 5.0, 5.0], [0.0, 0.0, 0.0])));

        let result = cal.result().unwrap();
        assert_eq!(result.sample_count, 100);
        assert_relative_eq!(result.bias.gyro.z, 0.02, epsilon = 1e-5);
        assert_relative_eq!(result.bias.gyro.x, 0.0);
        // Residual after removing gravity along +z
        assert_relative_eq!(result.bias.accel.z, 9.9 - STANDARD_GRAVITY, epsilon = 1e-4);
    }

    #[test]
    fn test_tilted_gravity_has_no_accel_bias() {
        let mut cal = BiasCalibrator::new(0.5);
        let g = STANDARD_GRAVITY;
        let tilted = [0.0, g * 0.6, g * 0.8];
        for i in 0..50u64 {
            cal.add_sample(&sample(i * 10_000, [0.0; 3], tilted));
        }
        cal.add_sample(&sample(600_000, [0.0; 3], tilted));

        let result = cal.result().unwrap();
        assert_relative_eq!(result.bias.accel.norm(), 0.0, epsilon = 1e-4);
        let force = result.mean_specific_force.unwrap();
        assert_relative_eq!(force.y, g * 0.6, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_window_completes_immediately() {
        let mut cal = BiasCalibrator::new(0.0);
        assert!(cal.add_sample(&sample(42, [1.0; 3], [0.0, 0.0, 9.8])));

        let result = cal.result().unwrap();
        assert_eq!(result.bias, ImuBias::zero());
        assert!(result.mean_specific_force.is_none());
    }

    #[test]
    fn test_reset() {
        let mut cal = BiasCalibrator::new(0.0);
        cal.add_sample(&sample(0, [0.0; 3], [0.0; 3]));
        assert!(cal.is_complete());

        cal.reset();
        assert!(!cal.is_complete());
        assert_eq!(cal.sample_count(), 0);
    }
}
