//! Point-capture workflow for interactive calibration.
//!
//! The interactive session (live video with crosshair guides, key bindings
//! to mark positions) reduces to three discrete commands: mark P1, mark P2,
//! finish. The state machine here models exactly that, independent of the
//! input transport, so a keyboard frontend, a remote API, or a test can all
//! drive it the same way.

use tracing::info;

use crate::calibration::record::{AlignmentRecord, StageReading};
use crate::error::CalibrationError;

/// Workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Waiting for the first reference point to be marked.
    AwaitingP1,
    /// P1 recorded; waiting for the second reference point.
    AwaitingP2,
    /// Both points recorded; the record can be taken.
    Complete,
}

/// Commands that drive the workflow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureCommand {
    /// Record the current stage readback as P1.
    MarkP1(StageReading),
    /// Record the current stage readback as P2.
    MarkP2(StageReading),
    /// Close the session and take the completed record.
    Finish,
}

/// Two-point capture session.
///
/// Either point may be re-marked before `Finish`; marking P2 before P1 and
/// finishing with a point missing are rejected.
#[derive(Debug, Default)]
pub struct PointCapture {
    p1: Option<StageReading>,
    p2: Option<StageReading>,
}

impl PointCapture {
    /// Start a fresh capture session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current workflow state.
    pub fn state(&self) -> CaptureState {
        match (self.p1, self.p2) {
            (None, _) => CaptureState::AwaitingP1,
            (Some(_), None) => CaptureState::AwaitingP2,
            (Some(_), Some(_)) => CaptureState::Complete,
        }
    }

    /// Apply a command.
    ///
    /// Returns the completed record on `Finish`, `None` for the marking
    /// commands.
    pub fn apply(
        &mut self,
        command: CaptureCommand,
    ) -> Result<Option<AlignmentRecord>, CalibrationError> {
        match command {
            CaptureCommand::MarkP1(reading) => {
                self.p1 = Some(reading);
                info!(
                    "updated P1: x = {:.4}, y = {:.4}, r = {:.4}, z = {:.4}",
                    reading.x, reading.y, reading.r, reading.z
                );
                Ok(None)
            }
            CaptureCommand::MarkP2(reading) => {
                if self.p1.is_none() {
                    return Err(CalibrationError::MissingP1);
                }
                self.p2 = Some(reading);
                info!(
                    "updated P2: x = {:.4}, y = {:.4}, r = {:.4}, z = {:.4}",
                    reading.x, reading.y, reading.r, reading.z
                );
                Ok(None)
            }
            CaptureCommand::Finish => {
                let p1 = self.p1.ok_or(CalibrationError::MissingP1)?;
                let p2 = self.p2.ok_or(CalibrationError::MissingP2)?;
                Ok(Some(AlignmentRecord { p1, p2 }))
            }
        }
    }
}
