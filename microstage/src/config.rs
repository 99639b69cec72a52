//! Scan run configuration.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hardware::Rounding;
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// When to re-base the scan plan on the encoder-corrected estimate.
///
/// With `Never` the sequencer walks the plan by dead reckoning alone. With
/// `EveryN(n)` the next displacement is computed from the measured position
/// every `n` completed targets, so accumulated step slip does not grow
/// without bound across a long mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReanchorPolicy {
    #[default]
    Never,
    EveryN(usize),
}

/// Parameters for one scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Stage velocity for every move in the run, mm/s.
    pub velocity_mm_s: f64,
    /// Step rounding mode passed through to the driver.
    pub rounding: Rounding,
    /// Pause after each move completes, before the frame is captured.
    pub settle: Duration,
    pub reanchor: ReanchorPolicy,
    /// Directory captured frames are written into.
    pub output_dir: PathBuf,
    /// Filename stem; frames are saved as `<prefix>_<index>.png`.
    pub file_prefix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            velocity_mm_s: 0.01,
            rounding: Rounding::NearestFullStep,
            settle: Duration::from_millis(500),
            reanchor: ReanchorPolicy::Never,
            output_dir: PathBuf::from("."),
            file_prefix: "field".to_string(),
        }
    }
}

impl ScanConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CalibrationError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Output path for the frame at `index`.
    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.png", self.file_prefix, index))
    }
}
