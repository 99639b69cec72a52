//! Two-point stage calibration.
//!
//! Calibration ties the sample frame to the stage frame from two reference
//! point correspondences:
//!
//! 1. Drive the stage so reference location P1 sits under the crosshair,
//!    focus, and record the stage readback.
//! 2. Repeat for P2, a known sample-frame distance away along a sample
//!    column.
//! 3. Build [`CalibrationParams`] from the two readings: translation from
//!    P1, rotation from the stage line P1 -> P2, zoom from the distance
//!    ratio, and the linear focus model from the two z readings.
//!
//! # Modules
//!
//! - [`params`] - derived transform parameters and their persistence
//! - [`record`] - raw two-point record (the `alignment.csv` format)
//! - [`workflow`] - transport-independent point-capture state machine

pub mod params;
pub mod record;
pub mod workflow;

pub use params::{CalibrationParams, CalibrationPoint};
pub use record::{AlignmentRecord, StageReading};
pub use workflow::{CaptureCommand, CaptureState, PointCapture};
