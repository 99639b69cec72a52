//! MICROSTAGE - sample-frame scanning for a motorized microscope stage.
//!
//! Drives a three-axis stepper stage under a fixed microscope camera so that
//! sample-relative locations can be visited and imaged, despite the stage's
//! native frame being arbitrarily rotated, scaled, and offset relative to the
//! sample. Pipeline: two-point calibration -> sample/stage transform -> scan
//! sequencer -> motion controller -> capture.

pub mod alignment;
pub mod calibration;
pub mod config;
pub mod error;
pub mod motion;
pub mod scan;

// Re-export commonly used types for external use
pub use crate::calibration::{
    AlignmentRecord, CalibrationParams, CalibrationPoint, CaptureCommand, CaptureState,
    PointCapture, StageReading,
};
pub use crate::config::{ReanchorPolicy, ScanConfig};
pub use crate::error::{CalibrationError, MotionError, ScanError};
pub use crate::motion::{MotionController, StagePosition};
pub use crate::scan::{ScanReport, ScanRow, ScanSequencer};
