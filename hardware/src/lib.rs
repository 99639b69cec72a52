//! Hardware interfaces for the motorized microscope stage rig.
//!
//! This crate defines the narrow capability interfaces behind which concrete
//! device bindings live: [`StageDriver`] for the three-axis stepper stage and
//! [`CaptureDevice`] for the microscope camera. Each interface has one
//! simulated implementation ([`SimulatedStage`], [`SimulatedCapture`]) used by
//! tests and dry-runs; production bindings (native DLL call, serial protocol)
//! plug in behind the same traits.

pub mod capture;
pub mod microdrive;
pub mod simulated;

pub use capture::{CaptureDevice, CaptureError, CaptureResult, SimulatedCapture};
pub use microdrive::{
    DriverFault, DriverResult, DriverStatusCode, LimitStatus, MoveCommand, Rounding,
    ENCODER_RESOLUTION_MM, FULL_STEP_MM, MICROSTEPS_PER_FULL_STEP, MIN_STEP_MM,
};
pub use simulated::SimulatedStage;

use nalgebra::Vector3;

/// Narrow interface to a three-axis stepper-stage driver session.
///
/// Maps one-to-one onto the MicroDrive command set: a session is opened once,
/// relative moves are issued per-axis with a shared velocity and step
/// rounding, and encoders may only be read while the stage is idle. Any
/// concrete binding (vendor library, serial protocol, simulator) can sit
/// behind this trait.
///
/// # Hardware contract
///
/// Encoders must not be read while the stage is in motion. Callers are
/// expected to block on [`wait_until_idle`](StageDriver::wait_until_idle)
/// before every [`read_encoders`](StageDriver::read_encoders) call;
/// implementations may enforce this by failing the read with
/// [`DriverStatusCode::NotReady`].
pub trait StageDriver {
    /// Open the driver session and acquire the device handle.
    ///
    /// A second open while a session is live must be rejected.
    fn open(&mut self) -> DriverResult<()>;

    /// Issue a relative move on all three axes.
    ///
    /// Returns as soon as the command is accepted; the move itself completes
    /// asynchronously. Follow with [`wait_until_idle`](Self::wait_until_idle).
    fn move_relative(&mut self, command: &MoveCommand) -> DriverResult<()>;

    /// Block until the previously commanded move has finished.
    fn wait_until_idle(&mut self) -> DriverResult<()>;

    /// Query whether the stage is currently in motion. Non-blocking.
    fn is_moving(&mut self) -> DriverResult<bool>;

    /// Read the per-axis encoder positions in mm, relative to the last
    /// encoder reset.
    fn read_encoders(&mut self) -> DriverResult<Vector3<f64>>;

    /// Read the limit-switch and move-status register. Non-blocking.
    fn read_limit_status(&mut self) -> DriverResult<LimitStatus>;

    /// Zero all encoders, making the current position the origin.
    fn reset_encoders(&mut self) -> DriverResult<()>;

    /// Release the device handle. Always succeeds; safe to call repeatedly.
    fn close(&mut self);
}
