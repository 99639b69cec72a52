//! In-memory stage driver for tests and dry-runs.

use nalgebra::Vector3;
use tracing::debug;

use crate::microdrive::{DriverFault, DriverResult, DriverStatusCode, LimitStatus, MoveCommand};
use crate::StageDriver;

/// Simulated three-axis stage.
///
/// Behaves like a well-behaved MicroDrive session: moves accumulate into the
/// encoder position once the stage goes idle, encoders refuse to be read
/// while a move is pending, and a second `open` on a live session is
/// rejected. Test hooks allow injecting a fixed per-move encoder slip and a
/// scripted failure at a chosen move index.
pub struct SimulatedStage {
    open: bool,
    moving: bool,
    encoder_mm: Vector3<f64>,
    pending_mm: Vector3<f64>,
    /// Extra encoder displacement applied on every completed move.
    slip_per_move_mm: Vector3<f64>,
    /// Move index (0-based) at which `move_relative` reports a device error.
    fail_at_move: Option<usize>,
    limit_status: LimitStatus,
    moves: Vec<MoveCommand>,
}

impl SimulatedStage {
    /// Create a simulated stage with ideal encoders and no scripted faults.
    pub fn new() -> Self {
        Self {
            open: false,
            moving: false,
            encoder_mm: Vector3::zeros(),
            pending_mm: Vector3::zeros(),
            slip_per_move_mm: Vector3::zeros(),
            fail_at_move: None,
            limit_status: LimitStatus::MOVE_OK,
            moves: Vec::new(),
        }
    }

    /// Apply a fixed encoder slip on every completed move.
    ///
    /// Models mechanical backlash or missed steps: the encoders report the
    /// commanded displacement plus this bias.
    pub fn with_encoder_slip(mut self, slip_mm: Vector3<f64>) -> Self {
        self.slip_per_move_mm = slip_mm;
        self
    }

    /// Script a device-error failure at the given move index (0-based).
    pub fn with_failure_at_move(mut self, index: usize) -> Self {
        self.fail_at_move = Some(index);
        self
    }

    /// Force the limit-status register reported by `read_limit_status`.
    pub fn set_limit_status(&mut self, status: LimitStatus) {
        self.limit_status = status;
    }

    /// All move commands accepted so far, in order.
    pub fn command_log(&self) -> &[MoveCommand] {
        &self.moves
    }

    /// Current simulated encoder position in mm.
    pub fn encoder_position(&self) -> Vector3<f64> {
        self.encoder_mm
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DriverFault::Status(DriverStatusCode::NotAttached))
        }
    }
}

impl Default for SimulatedStage {
    fn default() -> Self {
        Self::new()
    }
}

impl StageDriver for SimulatedStage {
    fn open(&mut self) -> DriverResult<()> {
        if self.open {
            // The session handle is exclusively owned; a second open is a
            // caller bug, rejected at this layer.
            return Err(DriverFault::Status(DriverStatusCode::UsageError));
        }
        self.open = true;
        debug!("simulated stage session opened");
        Ok(())
    }

    fn move_relative(&mut self, command: &MoveCommand) -> DriverResult<()> {
        self.ensure_open()?;
        if self.fail_at_move == Some(self.moves.len()) {
            self.limit_status.remove(LimitStatus::MOVE_OK);
            return Err(DriverFault::Status(DriverStatusCode::DeviceError));
        }
        self.moves.push(command.clone());
        self.pending_mm = command.displacement_mm;
        self.moving = true;
        Ok(())
    }

    fn wait_until_idle(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        if self.moving {
            self.encoder_mm += self.pending_mm + self.slip_per_move_mm;
            self.pending_mm = Vector3::zeros();
            self.moving = false;
        }
        Ok(())
    }

    fn is_moving(&mut self) -> DriverResult<bool> {
        self.ensure_open()?;
        Ok(self.moving)
    }

    fn read_encoders(&mut self) -> DriverResult<Vector3<f64>> {
        self.ensure_open()?;
        if self.moving {
            // Hardware contract: encoders are unreadable while in motion.
            return Err(DriverFault::Status(DriverStatusCode::NotReady));
        }
        Ok(self.encoder_mm)
    }

    fn read_limit_status(&mut self) -> DriverResult<LimitStatus> {
        self.ensure_open()?;
        Ok(self.limit_status)
    }

    fn reset_encoders(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        self.encoder_mm = Vector3::zeros();
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            debug!("simulated stage session closed");
        }
        self.open = false;
        self.moving = false;
    }
}
