//! Derived calibration parameters and their persistence.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::alignment;
use crate::calibration::record::StageReading;
use crate::error::CalibrationError;

/// One reference correspondence: where a sample-frame location sits in the
/// stage frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    /// Sample-frame location (u, v).
    pub sample: Vector2<f64>,
    /// Full stage readback at that location.
    pub stage: StageReading,
}

impl CalibrationPoint {
    /// Create a calibration point.
    pub fn new(sample: Vector2<f64>, stage: StageReading) -> Self {
        Self { sample, stage }
    }

    fn stage_xy(&self) -> Vector2<f64> {
        Vector2::new(self.stage.x, self.stage.y)
    }
}

/// Sample-to-stage transform parameters derived from a two-point calibration.
///
/// Immutable once built: produced by [`from_points`](Self::from_points) (or
/// loaded from disk) and consumed read-only for the duration of a session.
/// `zoom` is signed; a negative value encodes a mirrored stage axis. The
/// `zoom != 0` invariant is enforced on construction and load, so the
/// inverse transform is always available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Stage-frame offset of the sample origin, in mm.
    translation: [f64; 2],
    /// Stage rotation relative to the sample frame, in degrees.
    rotation_deg: f64,
    /// Signed uniform scale factor (stage mm per sample unit).
    zoom: f64,
    /// Stage height at v = 0, in mm.
    z0: f64,
    /// Stage height change per unit v, in mm.
    z_slope: f64,
}

impl CalibrationParams {
    /// Build parameters directly, validating the zoom invariant.
    pub fn new(
        translation: Vector2<f64>,
        rotation_deg: f64,
        zoom: f64,
        z0: f64,
        z_slope: f64,
    ) -> Result<Self, CalibrationError> {
        if zoom == 0.0 {
            return Err(CalibrationError::Degenerate(
                "zoom factor is zero; transform would not be invertible".to_string(),
            ));
        }
        Ok(Self {
            translation: [translation.x, translation.y],
            rotation_deg,
            zoom,
            z0,
            z_slope,
        })
    }

    /// Derive parameters from two reference correspondences.
    ///
    /// `sample_distance` is the known sample-frame distance between the two
    /// points; `inverted` flags a mirrored stage axis and flips the sign of
    /// the zoom factor.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::Degenerate`] when `sample_distance` is zero or the
    /// two points share a v coordinate (the focus slope divisor).
    pub fn from_points(
        p1: CalibrationPoint,
        p2: CalibrationPoint,
        sample_distance: f64,
        inverted: bool,
    ) -> Result<Self, CalibrationError> {
        let translation = alignment::derive_translation(p1.stage_xy(), p1.sample);
        let rotation_deg = alignment::derive_angle(p1.stage_xy(), p2.stage_xy());
        let zoom = alignment::derive_zoom(p1.stage_xy(), p2.stage_xy(), sample_distance, inverted)?;

        let dv = p2.sample.y - p1.sample.y;
        if dv == 0.0 {
            return Err(CalibrationError::Degenerate(
                "reference points share a v coordinate; focus slope is undefined".to_string(),
            ));
        }
        let z_slope = (p2.stage.z - p1.stage.z) / dv;

        Self::new(translation, rotation_deg, zoom, p1.stage.z, z_slope)
    }

    /// Stage-frame offset of the sample origin.
    pub fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.translation[0], self.translation[1])
    }

    /// Stage rotation relative to the sample frame, in degrees.
    pub fn rotation_deg(&self) -> f64 {
        self.rotation_deg
    }

    /// Signed uniform scale factor.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Linear focus model as `(z0, slope)`.
    pub fn focus_model(&self) -> (f64, f64) {
        (self.z0, self.z_slope)
    }

    // ============== Conversion Functions ==============

    /// Convert a sample-frame point to stage-frame coordinates.
    pub fn sample_to_stage(&self, point: Vector2<f64>) -> Vector2<f64> {
        alignment::sample_to_stage(point, self.translation(), self.rotation_deg, self.zoom)
    }

    /// Convert a stage-frame point back to sample-frame coordinates.
    pub fn stage_to_sample(&self, point: Vector2<f64>) -> Vector2<f64> {
        alignment::stage_to_sample(point, self.translation(), self.rotation_deg, self.zoom)
    }

    /// Stage height (focus) for a sample-frame v coordinate.
    pub fn focus_z(&self, v: f64) -> f64 {
        alignment::focus_z(v, self.z0, self.z_slope)
    }

    // ============== Persistence ==============

    /// Load parameters from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, the JSON is invalid, or the
    /// stored zoom is zero.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let params: Self = serde_json::from_reader(reader)?;
        if params.zoom == 0.0 {
            return Err(CalibrationError::Degenerate(
                "stored calibration has zero zoom".to_string(),
            ));
        }
        Ok(params)
    }

    /// Save parameters to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
