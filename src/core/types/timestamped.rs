//! Generic timestamp wrapper.

/// Generic timestamp wrapper for any data type.
///
/// Timestamps are in microseconds on the sensor clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T> {
    /// The wrapped data
    pub data: T,
    /// Timestamp in microseconds
    pub timestamp_us: u64,
}

impl<T> Timestamped<T> {
    /// Create a new timestamped value.
    #[inline]
    pub fn new(data: T, timestamp_us: u64) -> Self {
        Self { data, timestamp_us }
    }

    /// Map the inner data while preserving timestamp.
    #[inline]
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Timestamped<U> {
        Timestamped {
            data: f(self.data),
            timestamp_us: self.timestamp_us,
        }
    }

    /// Timestamp in seconds.
    #[inline]
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_us as f64 * 1e-6
    }
}

/// Anything ordered on the sensor clock.
pub trait Stamped {
    /// Timestamp in microseconds.
    fn timestamp_us(&self) -> u64;
}

impl<T> Stamped for Timestamped<T> {
    #[inline]
    fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }
}
