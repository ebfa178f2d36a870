//! TUM trajectory export.
//!
//! One pose per line, timestamp in seconds:
//!
//! ```text
//! timestamp tx ty tz qx qy qz qw
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use thiserror::Error;

use crate::core::types::{Pose3D, Timestamped};

/// Trajectory export/import errors.
#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("trajectory I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed trajectory line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Write poses to `path` in TUM format. Returns the number of poses written.
pub fn write_tum(path: &Path, poses: &[Timestamped<Pose3D>]) -> Result<usize, TrajectoryError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_tum_to(&mut writer, poses)?;
    writer.flush()?;
    log::info!("Saved {} poses to {}", poses.len(), path.display());
    Ok(poses.len())
}

/// Write poses in TUM format to any writer.
pub fn write_tum_to<W: Write>(
    writer: &mut W,
    poses: &[Timestamped<Pose3D>],
) -> Result<(), TrajectoryError> {
    for stamped in poses {
        let p = &stamped.data.position;
        let q = stamped.data.orientation.quaternion();
        writeln!(
            writer,
            "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
            stamped.timestamp_secs(),
            p.x,
            p.y,
            p.z,
            q.i,
            q.j,
            q.k,
            q.w
        )?;
    }
    Ok(())
}

/// Read a TUM trajectory. Blank lines and `#` comments are skipped.
pub fn read_tum(path: &Path) -> Result<Vec<Timestamped<Pose3D>>, TrajectoryError> {
    let reader = BufReader::new(File::open(path)?);
    let mut poses = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_error = |reason: String| TrajectoryError::Parse {
            line: i + 1,
            reason,
        };

        let values: Vec<f64> = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<_, _>>()
            .map_err(|e| parse_error(e.to_string()))?;
        if values.len() != 8 {
            return Err(parse_error(format!("expected 8 fields, got {}", values.len())));
        }

        let position = Vector3::new(values[1], values[2], values[3]).cast::<f32>();
        let q = Quaternion::new(values[7], values[4], values[5], values[6]).cast::<f32>();
        let orientation = UnitQuaternion::try_new(q, 1e-6)
            .ok_or_else(|| parse_error("zero quaternion".into()))?;

        poses.push(Timestamped::new(
            Pose3D::new(position, orientation),
            (values[0] * 1e6).round() as u64,
        ));
    }
    Ok(poses)
}
