//! Motion controller for the three-axis stepper stage.
//!
//! Owns the driver session lifecycle and the two running position estimates.
//! Each move is an atomic blocking operation: issue the relative move, wait
//! for the driver to report idle, then read the encoders exactly once. The
//! session state machine is {Disconnected} -> connect -> {Idle} ->
//! move_relative -> {Moving} -> complete -> {Idle}, with disconnect allowed
//! from any state; no move is accepted while disconnected.

use hardware::{LimitStatus, MoveCommand, Rounding, StageDriver};
use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::MotionError;

/// Dual running position estimate, in mm per axis.
///
/// `commanded` is dead reckoning (sum of commanded displacements);
/// `encoder_corrected` sums the measured encoder delta after each move. The
/// redundancy is deliberate: the two fields are never merged, so callers can
/// compare them and flag excessive divergence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePosition {
    /// Accumulated commanded displacement since the last origin reset.
    pub commanded: Vector3<f64>,
    /// Accumulated measured displacement since the last origin reset.
    pub encoder_corrected: Vector3<f64>,
}

impl StagePosition {
    fn zero() -> Self {
        Self {
            commanded: Vector3::zeros(),
            encoder_corrected: Vector3::zeros(),
        }
    }

    /// Divergence between the encoder-corrected and commanded estimates.
    pub fn drift(&self) -> Vector3<f64> {
        self.encoder_corrected - self.commanded
    }
}

/// Motion controller wrapping a [`StageDriver`] session.
///
/// The driver handle is exclusively owned; it is opened by
/// [`connect`](Self::connect) and released by [`disconnect`](Self::disconnect)
/// or on drop, on every exit path.
pub struct MotionController<D: StageDriver> {
    driver: D,
    connected: bool,
    position: StagePosition,
    /// Encoder reading at the end of the previous move, for delta tracking.
    last_encoder: Vector3<f64>,
}

impl<D: StageDriver> MotionController<D> {
    /// Open the driver session and take ownership of it.
    pub fn connect(mut driver: D) -> Result<Self, MotionError> {
        driver.open()?;
        info!("stage driver session opened");
        Ok(Self {
            driver,
            connected: true,
            position: StagePosition::zero(),
            last_encoder: Vector3::zeros(),
        })
    }

    /// Release the driver handle. Idempotent; always succeeds.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.driver.close();
            self.connected = false;
            info!("stage driver session closed");
        }
    }

    /// Whether a driver session is currently live.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Both running position estimates.
    pub fn position(&self) -> &StagePosition {
        &self.position
    }

    /// Execute a relative move and update both position estimates.
    ///
    /// Blocks until the physical move, the completion wait, and the encoder
    /// read all finish. The encoders are read once per completed move, after
    /// the idle wait - the hardware contract forbids reading them while the
    /// stage is in motion.
    pub fn move_relative(
        &mut self,
        displacement_mm: Vector3<f64>,
        velocity_mm_s: f64,
        rounding: Rounding,
    ) -> Result<(), MotionError> {
        self.ensure_connected()?;

        let command = MoveCommand {
            displacement_mm,
            velocity_mm_s,
            rounding,
        };
        debug!(
            "relative move: [{:.6}, {:.6}, {:.6}] mm at {:.4} mm/s",
            displacement_mm.x, displacement_mm.y, displacement_mm.z, velocity_mm_s
        );

        self.driver.move_relative(&command)?;
        self.driver.wait_until_idle()?;

        let reading = self.driver.read_encoders()?;
        let measured_delta = reading - self.last_encoder;
        self.last_encoder = reading;

        self.position.commanded += displacement_mm;
        self.position.encoder_corrected += measured_delta;
        Ok(())
    }

    /// Make the current physical position the origin.
    ///
    /// Zeros the driver encoders and both running estimates. Used once at
    /// the start of a calibration session.
    pub fn reset_origin(&mut self) -> Result<(), MotionError> {
        self.ensure_connected()?;
        self.driver.reset_encoders()?;
        self.position = StagePosition::zero();
        self.last_encoder = Vector3::zeros();
        info!("origin set at current stage position");
        Ok(())
    }

    /// Whether the stage is currently in motion. Non-blocking passthrough.
    pub fn is_moving(&mut self) -> Result<bool, MotionError> {
        self.ensure_connected()?;
        Ok(self.driver.is_moving()?)
    }

    /// Read the limit-switch and move-status register. Non-blocking
    /// passthrough.
    pub fn read_status(&mut self) -> Result<LimitStatus, MotionError> {
        self.ensure_connected()?;
        Ok(self.driver.read_limit_status()?)
    }

    /// Borrow the underlying driver. Lets tests and diagnostics inspect
    /// simulated driver state without giving up the session.
    pub fn driver_ref(&self) -> &D {
        &self.driver
    }

    fn ensure_connected(&self) -> Result<(), MotionError> {
        if self.connected {
            Ok(())
        } else {
            Err(MotionError::NotConnected)
        }
    }
}

impl<D: StageDriver> Drop for MotionController<D> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
