//! Raw two-point calibration record and its on-disk format.
//!
//! The record stores the full stage readback (x, y, r, z) at the two
//! reference locations, as a small CSV table with columns `rows,P1,P2` and
//! one row per axis. The focus correction can be rebuilt from the record
//! alone, without re-deriving the planar transform.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CalibrationError;

/// Stage readback at one reference location: x/y/z in mm, r in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageReading {
    /// Stage x position in mm.
    pub x: f64,
    /// Stage y position in mm.
    pub y: f64,
    /// Stage rotation axis position in degrees.
    pub r: f64,
    /// Stage height (focus) in mm.
    pub z: f64,
}

impl StageReading {
    /// Create a reading with the rotation axis at zero.
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, r: 0.0, z }
    }
}

/// Two-point calibration record: stage readings at P1 and P2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentRecord {
    /// Stage reading at the first reference location.
    pub p1: StageReading,
    /// Stage reading at the second reference location.
    pub p2: StageReading,
}

/// Axis row labels, in file order.
const AXIS_ROWS: [&str; 4] = ["x", "y", "r", "z"];

impl AlignmentRecord {
    /// Rebuild the linear focus correction from the record.
    ///
    /// Uses the stage y readings as the sample-column ordinate:
    /// `slope = (z2 - z1) / (y2 - y1)`, `z0 = z1`. Fails when the two
    /// points share a y reading (coincident focus samples).
    pub fn focus_correction(&self) -> Result<(f64, f64), CalibrationError> {
        let dy = self.p2.y - self.p1.y;
        if dy == 0.0 {
            return Err(CalibrationError::Degenerate(
                "focus reference points share a y coordinate".to_string(),
            ));
        }
        let slope = (self.p2.z - self.p1.z) / dy;
        Ok((self.p1.z, slope))
    }

    /// Write the record as a `rows,P1,P2` CSV table.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["rows", "P1", "P2"])?;
        let p1 = [self.p1.x, self.p1.y, self.p1.r, self.p1.z];
        let p2 = [self.p2.x, self.p2.y, self.p2.r, self.p2.z];
        for (i, label) in AXIS_ROWS.iter().enumerate() {
            writer.write_record([label.to_string(), p1[i].to_string(), p2[i].to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a record written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut p1 = [0.0f64; 4];
        let mut p2 = [0.0f64; 4];
        let mut seen = [false; 4];

        for result in reader.records() {
            let row = result?;
            if row.len() < 3 {
                return Err(CalibrationError::MalformedRecord(format!(
                    "expected 3 columns, got {}",
                    row.len()
                )));
            }
            let label = row[0].trim();
            let index = AXIS_ROWS
                .iter()
                .position(|axis| *axis == label)
                .ok_or_else(|| {
                    CalibrationError::MalformedRecord(format!("unknown axis row {label:?}"))
                })?;
            p1[index] = parse_field(&row[1], label, "P1")?;
            p2[index] = parse_field(&row[2], label, "P2")?;
            seen[index] = true;
        }

        if let Some(missing) = AXIS_ROWS.iter().zip(seen).find(|(_, s)| !s) {
            return Err(CalibrationError::MalformedRecord(format!(
                "missing axis row {:?}",
                missing.0
            )));
        }

        Ok(Self {
            p1: StageReading { x: p1[0], y: p1[1], r: p1[2], z: p1[3] },
            p2: StageReading { x: p2[0], y: p2[1], r: p2[2], z: p2[3] },
        })
    }
}

fn parse_field(value: &str, axis: &str, column: &str) -> Result<f64, CalibrationError> {
    value.trim().parse().map_err(|_| {
        CalibrationError::MalformedRecord(format!("non-numeric {column} value for axis {axis}: {value:?}"))
    })
}
