//! Line-based sensor recording for offline replay.
//!
//! A recording is a text file with one event per line, timestamps in
//! seconds on the sensor clock:
//!
//! ```text
//! # comment
//! imu   <t> <wx> <wy> <wz> <ax> <ay> <az>
//! sweep <t> <points.xyz>
//! box   <t> <cx> <cy> <cz> <dx> <dy> <dz> <qx> <qy> <qz> <qw>
//! ```
//!
//! Sweep paths are resolved relative to the recording's directory and hold
//! one `x y z [intensity]` point per line. Consecutive `box` lines sharing a
//! timestamp form one detection frame; a frame with no boxes is written as
//! `box <t>`.
//!
//! # Example
//!
//! ```ignore
//! let reader = RecordingReader::open("run01/recording.txt")?;
//! for event in reader {
//!     match event? {
//!         RecordEvent::Imu(sample) => node.push_imu(sample),
//!         RecordEvent::Detections(frame) => node.push_detections(frame),
//!         RecordEvent::Sweep(sweep) => node.submit_sweep_blocking(sweep),
//!     }
//! }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};
use thiserror::Error;

use crate::core::types::{DetectionFrame, ImuSample, OrientedBox, PointCloud3D, Sweep};

/// Recording replay errors.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("recording I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// One replayed sensor event.
#[derive(Debug, Clone)]
pub enum RecordEvent {
    Imu(ImuSample),
    Sweep(Sweep),
    Detections(DetectionFrame),
}

impl RecordEvent {
    /// Event timestamp in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        match self {
            RecordEvent::Imu(sample) => sample.timestamp_us,
            RecordEvent::Sweep(sweep) => sweep.timestamp_us,
            RecordEvent::Detections(frame) => frame.timestamp_us,
        }
    }
}

/// Parsed line before detection frames are grouped.
enum Line {
    Event(RecordEvent),
    Box { timestamp_us: u64, bbox: Option<OrientedBox> },
}

/// Lazy reader yielding events in file order.
pub struct RecordingReader {
    path: PathBuf,
    base_dir: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: usize,
    /// Event read past the end of a detection frame
    pending: Option<Line>,
    events_read: usize,
}

impl RecordingReader {
    /// Open a recording file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RecordingError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        log::info!("Opened recording {}", path.display());

        Ok(Self {
            path,
            base_dir,
            lines: BufReader::new(file).lines(),
            line_number: 0,
            pending: None,
            events_read: 0,
        })
    }

    /// Number of events yielded so far.
    pub fn events_read(&self) -> usize {
        self.events_read
    }

    fn parse_error(&self, reason: impl Into<String>) -> RecordingError {
        RecordingError::Parse {
            path: self.path.clone(),
            line: self.line_number,
            reason: reason.into(),
        }
    }

    /// Next non-comment line, parsed.
    fn next_line(&mut self) -> Result<Option<Line>, RecordingError> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }

        loop {
            let Some(raw) = self.lines.next() else {
                return Ok(None);
            };
            let raw = raw?;
            self.line_number += 1;

            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            return self.parse_line(text).map(Some);
        }
    }

    fn parse_line(&self, text: &str) -> Result<Line, RecordingError> {
        let mut fields = text.split_whitespace();
        let kind = fields.next().unwrap_or_default();
        let timestamp_us = fields
            .next()
            .ok_or_else(|| self.parse_error("missing timestamp"))
            .and_then(|t| self.parse_seconds(t))?;

        match kind {
            "imu" => {
                let v = self.parse_floats(fields, 6)?;
                Ok(Line::Event(RecordEvent::Imu(ImuSample::new(
                    timestamp_us,
                    Vector3::new(v[0], v[1], v[2]),
                    Vector3::new(v[3], v[4], v[5]),
                ))))
            }
            "sweep" => {
                let file = fields
                    .next()
                    .ok_or_else(|| self.parse_error("sweep line without point file"))?;
                let cloud = load_xyz(&self.base_dir.join(file))?;
                Ok(Line::Event(RecordEvent::Sweep(Sweep::new(cloud, timestamp_us))))
            }
            "box" => {
                let rest: Vec<&str> = fields.collect();
                if rest.is_empty() {
                    return Ok(Line::Box { timestamp_us, bbox: None });
                }
                let v = self.parse_floats(rest.into_iter(), 10)?;
                let q = Quaternion::new(v[9], v[6], v[7], v[8]);
                let orientation = UnitQuaternion::try_new(q, 1e-6)
                    .ok_or_else(|| self.parse_error("box orientation is a zero quaternion"))?;
                Ok(Line::Box {
                    timestamp_us,
                    bbox: Some(OrientedBox::new(
                        Point3::new(v[0], v[1], v[2]),
                        Vector3::new(v[3], v[4], v[5]),
                        orientation,
                    )),
                })
            }
            other => Err(self.parse_error(format!("unknown record type '{other}'"))),
        }
    }

    fn parse_seconds(&self, field: &str) -> Result<u64, RecordingError> {
        let secs: f64 = field
            .parse()
            .map_err(|_| self.parse_error(format!("bad timestamp '{field}'")))?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(self.parse_error(format!("bad timestamp '{field}'")));
        }
        Ok((secs * 1e6).round() as u64)
    }

    fn parse_floats<'a>(
        &self,
        fields: impl Iterator<Item = &'a str>,
        expected: usize,
    ) -> Result<Vec<f32>, RecordingError> {
        let values = fields
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.parse_error(e.to_string()))?;
        if values.len() != expected {
            return Err(self.parse_error(format!(
                "expected {expected} values, got {}",
                values.len()
            )));
        }
        Ok(values)
    }

    /// Collect consecutive boxes with the same timestamp into one frame.
    fn read_frame(
        &mut self,
        timestamp_us: u64,
        first: Option<OrientedBox>,
    ) -> Result<DetectionFrame, RecordingError> {
        let mut boxes: Vec<OrientedBox> = first.into_iter().collect();

        while let Some(line) = self.next_line()? {
            match line {
                Line::Box { timestamp_us: t, bbox } if t == timestamp_us => boxes.extend(bbox),
                other => {
                    self.pending = Some(other);
                    break;
                }
            }
        }
        Ok(DetectionFrame::new(boxes, timestamp_us))
    }
}

impl Iterator for RecordingReader {
    type Item = Result<RecordEvent, RecordingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.next_line() {
            Ok(Some(Line::Event(event))) => Ok(event),
            Ok(Some(Line::Box { timestamp_us, bbox })) => self
                .read_frame(timestamp_us, bbox)
                .map(RecordEvent::Detections),
            Ok(None) => return None,
            Err(e) => Err(e),
        };
        if event.is_ok() {
            self.events_read += 1;
        }
        Some(event)
    }
}

/// Load a point file with one `x y z [intensity]` point per line.
pub fn load_xyz(path: &Path) -> Result<PointCloud3D, RecordingError> {
    let reader = BufReader::new(File::open(path)?);
    let mut cloud = PointCloud3D::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let parse_error = |reason: String| RecordingError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            reason,
        };

        let values = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| parse_error(e.to_string()))?;

        let point = match values.len() {
            3 | 4 => Point3::new(values[0], values[1], values[2]),
            n => return Err(parse_error(format!("expected 3 or 4 values, got {n}"))),
        };
        match values.get(3) {
            Some(&intensity) => cloud.push_with_intensity(point, intensity),
            None => cloud.push(point),
        }
    }

    log::debug!("Loaded {} points from {}", cloud.len(), path.display());
    Ok(cloud)
}
