//! Gyro integration between sweep timestamps.
//!
//! Samples arrive from the IMU thread through [`InertialIntegrator::push`],
//! which only holds the IMU lock for one sorted insert. Until calibration
//! completes, samples feed the [`BiasCalibrator`] and are not buffered;
//! afterwards they are stored bias-corrected.
//!
//! The rotational prior between two sweeps is a first-order quaternion
//! integration of the buffered angular velocities:
//!
//! ```text
//! q ← normalize(q ⊗ [1, ½·ω·Δt])    for every sample in (t_prev, t_curr]
//! ```

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::calibration::{BiasCalibrator, CalibrationResult};
use crate::core::buffer::TimeSortedBuffer;
use crate::core::types::{ImuBias, ImuSample};

/// IMU configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Use the IMU for the rotational prior.
    ///
    /// When disabled, every prior is identity and sweeps are processed
    /// without waiting for calibration.
    pub enabled: bool,

    /// Stationary calibration window on the IMU clock (seconds).
    ///
    /// Default: 3.0s
    pub calibration_time: f32,

    /// Number of samples kept.
    ///
    /// Default: 2000 (10s at 200Hz)
    pub buffer_size: usize,

    /// Derive the initial orientation from the calibration gravity estimate.
    pub gravity_align: bool,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            calibration_time: 3.0,
            buffer_size: 2000,
            gravity_align: true,
        }
    }
}

/// Rotation predicted between two sweeps.
#[derive(Debug, Clone, Copy)]
pub struct RotationPrior {
    /// Orientation delta from the previous sweep frame to the current one.
    pub delta: UnitQuaternion<f32>,
    /// Samples integrated. Zero means the delta is the identity fallback.
    pub samples: usize,
}

impl RotationPrior {
    /// Identity prior used when no samples cover the interval.
    pub fn identity() -> Self {
        Self {
            delta: UnitQuaternion::identity(),
            samples: 0,
        }
    }

    /// True if no sample covered the interval.
    pub fn is_underrun(&self) -> bool {
        self.samples == 0
    }
}

struct ImuState {
    buffer: TimeSortedBuffer<ImuSample>,
    calibrator: BiasCalibrator,
    calibration: Option<CalibrationResult>,
}

/// Thread-safe inertial integrator.
pub struct InertialIntegrator {
    config: ImuConfig,
    state: Mutex<ImuState>,
}

impl InertialIntegrator {
    /// Create a new integrator.
    pub fn new(config: ImuConfig) -> Self {
        Self {
            state: Mutex::new(ImuState {
                buffer: TimeSortedBuffer::new(config.buffer_size),
                calibrator: BiasCalibrator::new(config.calibration_time),
                calibration: None,
            }),
            config,
        }
    }

    /// Get configuration.
    pub fn config(&self) -> &ImuConfig {
        &self.config
    }

    /// Deliver one sample.
    pub fn push(&self, sample: ImuSample) {
        let mut state = self.state.lock();

        if let Some(calibration) = state.calibration {
            state.buffer.push(sample.corrected(&calibration.bias));
            return;
        }

        if state.calibrator.add_sample(&sample)
            && let Some(result) = state.calibrator.result().copied()
        {
            log::info!(
                "IMU calibrated from {} samples: gyro bias [{:.5}, {:.5}, {:.5}] rad/s, accel bias [{:.4}, {:.4}, {:.4}] m/s²",
                result.sample_count,
                result.bias.gyro.x,
                result.bias.gyro.y,
                result.bias.gyro.z,
                result.bias.accel.x,
                result.bias.accel.y,
                result.bias.accel.z,
            );
            state.calibration = Some(result);
            state.buffer.push(sample.corrected(&result.bias));
        }
    }

    /// Check if the calibration window has completed.
    pub fn is_calibrated(&self) -> bool {
        self.state.lock().calibration.is_some()
    }

    /// Estimated bias, once calibrated.
    pub fn bias(&self) -> Option<ImuBias> {
        self.state.lock().calibration.map(|c| c.bias)
    }

    /// Orientation that levels the sensor frame.
    ///
    /// Rotates the mean calibration specific force (which points up, away
    /// from gravity) onto +Z. `None` before calibration, when no sample was
    /// averaged, or when gravity alignment is disabled.
    pub fn gravity_alignment(&self) -> Option<UnitQuaternion<f32>> {
        if !self.config.gravity_align {
            return None;
        }
        let force = self.state.lock().calibration?.mean_specific_force?;
        let aligned = UnitQuaternion::rotation_between(&force, &Vector3::z())?;
        let (roll, pitch, yaw) = aligned.euler_angles();
        log::info!(
            "Gravity alignment: roll {:.2}°, pitch {:.2}°, yaw {:.2}°",
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees()
        );
        Some(aligned)
    }

    /// Integrate buffered angular velocity over `(t_prev_us, t_curr_us]`.
    ///
    /// Returns the identity prior when no samples fall in the interval.
    pub fn predict_delta(&self, t_prev_us: u64, t_curr_us: u64) -> RotationPrior {
        let state = self.state.lock();

        let mut q = Quaternion::<f64>::identity();
        let mut last_us = t_prev_us;
        let mut samples = 0;

        for sample in state.buffer.range(t_prev_us, t_curr_us) {
            let dt = (sample.timestamp_us - last_us) as f64 * 1e-6;
            let half = sample.angular_velocity.cast::<f64>() * (0.5 * dt);
            let dq = Quaternion::new(1.0, half.x, half.y, half.z);
            q = (q * dq).normalize();
            last_us = sample.timestamp_us;
            samples += 1;
        }

        if samples == 0 {
            return RotationPrior::identity();
        }

        RotationPrior {
            delta: UnitQuaternion::new_normalize(q.cast::<f32>()),
            samples,
        }
    }

    /// Number of buffered (calibrated) samples.
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }
}
