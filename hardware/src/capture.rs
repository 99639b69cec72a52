//! Camera abstraction for the microscope imaging path.
//!
//! Provides a unified interface for frame acquisition that can be backed by
//! either a real capture device or [`SimulatedCapture`] for testing. Frames
//! are 16-bit grayscale arrays; `save` writes them as 16-bit gray PNG.

use image::{ImageBuffer, Luma};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Error type for capture operations.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Frame acquisition failed.
    #[error("capture error: {0}")]
    Capture(String),

    /// Writing a frame to disk failed.
    #[error("save error: {0}")]
    Save(String),
}

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for the microscope camera.
///
/// Abstracts frame acquisition so tests can run against [`SimulatedCapture`]
/// and production against a real video source behind the same interface.
pub trait CaptureDevice {
    /// Acquire a single frame from the camera.
    fn acquire_frame(&mut self) -> CaptureResult<Array2<u16>>;

    /// Save a frame to disk as a 16-bit grayscale PNG.
    fn save(&mut self, frame: &Array2<u16>, path: &Path) -> CaptureResult<()> {
        let img = array2_to_gray16_image(frame);
        img.save(path)
            .map_err(|e| CaptureError::Save(format!("{}: {e}", path.display())))?;
        debug!("saved frame to {}", path.display());
        Ok(())
    }
}

/// Convert a 2D array to a 16-bit grayscale image buffer.
pub fn array2_to_gray16_image(frame: &Array2<u16>) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    let (height, width) = frame.dim();
    let data = frame.iter().copied().collect();
    ImageBuffer::from_raw(width as u32, height as u32, data)
        .expect("frame dimensions match buffer length")
}

/// Simulated capture device for testing.
///
/// Serves a scripted sequence of frames (repeating the last one when the
/// script runs out) and records every save path in order instead of touching
/// the filesystem.
pub struct SimulatedCapture {
    frames: Vec<Array2<u16>>,
    frame_index: usize,
    saved_paths: Vec<PathBuf>,
    fail_acquire: bool,
}

impl SimulatedCapture {
    /// Create a simulated capture device with scripted frames.
    pub fn new(frames: Vec<Array2<u16>>) -> Self {
        Self {
            frames,
            frame_index: 0,
            saved_paths: Vec::new(),
            fail_acquire: false,
        }
    }

    /// Create a device that returns a uniform frame of the given shape.
    pub fn uniform(height: usize, width: usize, value: u16) -> Self {
        Self::new(vec![Array2::from_elem((height, width), value)])
    }

    /// Make every subsequent `acquire_frame` fail.
    pub fn fail_acquisitions(&mut self) {
        self.fail_acquire = true;
    }

    /// Paths passed to `save`, in call order.
    pub fn saved_paths(&self) -> &[PathBuf] {
        &self.saved_paths
    }
}

impl CaptureDevice for SimulatedCapture {
    fn acquire_frame(&mut self) -> CaptureResult<Array2<u16>> {
        if self.fail_acquire {
            return Err(CaptureError::Capture("simulated acquisition failure".to_string()));
        }
        if self.frames.is_empty() {
            return Err(CaptureError::Capture("no scripted frames".to_string()));
        }
        let index = self.frame_index.min(self.frames.len() - 1);
        self.frame_index += 1;
        Ok(self.frames[index].clone())
    }

    fn save(&mut self, _frame: &Array2<u16>, path: &Path) -> CaptureResult<()> {
        self.saved_paths.push(path.to_path_buf());
        Ok(())
    }
}
