use hardware::{CaptureError, DriverFault};
use thiserror::Error;

/// Errors produced while deriving or persisting a calibration.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Degenerate geometric input (zero reference distance, coincident focus
    /// samples). Signalled instead of producing NaN/infinite parameters.
    #[error("invalid calibration: {0}")]
    Degenerate(String),

    /// P1 has not been recorded yet.
    #[error("calibration point P1 not yet recorded")]
    MissingP1,

    /// P2 has not been recorded yet.
    #[error("calibration point P2 not yet recorded")]
    MissingP2,

    /// IO error during save/load.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The two-point record file does not have the expected row layout.
    #[error("malformed alignment record: {0}")]
    MalformedRecord(String),
}

/// Errors produced by the motion controller.
#[derive(Error, Debug)]
pub enum MotionError {
    /// An operation requiring a live driver session was attempted before
    /// connect or after disconnect.
    #[error("stage driver session is not connected")]
    NotConnected,

    /// The underlying driver reported a non-success status, including
    /// limit-switch faults.
    #[error("stage driver fault: {0}")]
    Driver(#[from] DriverFault),
}

/// Errors produced by the scan sequencer.
///
/// A partially completed physical move cannot be safely replayed without
/// fresh position knowledge, so nothing here is retried automatically; every
/// variant carries enough context (failing target index, completed count) to
/// resume manually.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A stage move failed; the remaining targets were abandoned.
    #[error("scan aborted at target {failed_index} after {completed} completed: {source}")]
    Aborted {
        /// Index of the target whose move failed.
        failed_index: usize,
        /// Number of targets completed before the failure.
        completed: usize,
        /// The underlying motion failure.
        #[source]
        source: MotionError,
    },

    /// Frame acquisition or save failed; the remaining targets were
    /// abandoned so image indices stay aligned with the sample-frame plan.
    #[error("capture failed at target {failed_index} after {completed} completed: {source}")]
    CaptureFailed {
        /// Index of the target whose capture failed.
        failed_index: usize,
        /// Number of targets completed before the failure.
        completed: usize,
        /// The underlying capture failure.
        #[source]
        source: CaptureError,
    },

    /// The caller raised the abort flag between targets.
    #[error("scan cancelled after {completed} completed targets")]
    Cancelled {
        /// Number of targets completed before cancellation.
        completed: usize,
    },
}

impl ScanError {
    /// Number of targets that completed before the scan stopped.
    pub fn completed(&self) -> usize {
        match self {
            Self::Aborted { completed, .. }
            | Self::CaptureFailed { completed, .. }
            | Self::Cancelled { completed } => *completed,
        }
    }
}
