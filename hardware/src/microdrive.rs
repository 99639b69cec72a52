//! MicroDrive command vocabulary: status codes, limit register, step rounding.
//!
//! The stepper stage is a Mad City Labs MicroDrive-class device. Its linear
//! actuators have a full-step resolution of 1.524 µm and run in a
//! divide-by-16 microstep mode; encoder-equipped stages measure at 50 nm
//! resolution. The constants and code tables here come from the vendor
//! documentation and are shared by every [`StageDriver`](crate::StageDriver)
//! binding.

use bitflags::bitflags;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Full-step resolution of the linear actuators, in mm (1.524 µm).
pub const FULL_STEP_MM: f64 = 1.524e-3;

/// Microsteps per full step (divide-by-16 mode).
pub const MICROSTEPS_PER_FULL_STEP: u32 = 16;

/// Minimum commandable step, in mm (95.25 nm).
pub const MIN_STEP_MM: f64 = FULL_STEP_MM / MICROSTEPS_PER_FULL_STEP as f64;

/// Encoder measurement resolution, in mm (50 nm).
pub const ENCODER_RESOLUTION_MM: f64 = 5.0e-5;

/// Status codes returned by the MicroDrive command interface.
///
/// Every driver call reports one of these; anything other than
/// [`Success`](DriverStatusCode::Success) is surfaced as a [`DriverFault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatusCode {
    /// Task completed successfully.
    Success,
    /// An internal sanity check failed.
    GeneralError,
    /// Data transfer to the device failed; a power cycle is likely required.
    DeviceError,
    /// The device is not attached.
    NotAttached,
    /// The device does not support the requested function.
    UsageError,
    /// The device is busy completing or waiting to complete another task.
    NotReady,
    /// An argument is out of range or a required pointer was null.
    ArgumentError,
    /// The addressed axis does not exist on this device.
    InvalidAxis,
    /// The session handle is not valid.
    InvalidHandle,
}

impl DriverStatusCode {
    /// Decode a raw status code, if known.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            -1 => Some(Self::GeneralError),
            -2 => Some(Self::DeviceError),
            -3 => Some(Self::NotAttached),
            -4 => Some(Self::UsageError),
            -5 => Some(Self::NotReady),
            -6 => Some(Self::ArgumentError),
            -7 => Some(Self::InvalidAxis),
            -8 => Some(Self::InvalidHandle),
            _ => None,
        }
    }

    /// The raw wire code for this status.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::GeneralError => -1,
            Self::DeviceError => -2,
            Self::NotAttached => -3,
            Self::UsageError => -4,
            Self::NotReady => -5,
            Self::ArgumentError => -6,
            Self::InvalidAxis => -7,
            Self::InvalidHandle => -8,
        }
    }

    /// Whether this status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for DriverStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::GeneralError => "general error",
            Self::DeviceError => "device error",
            Self::NotAttached => "device not attached",
            Self::UsageError => "usage error",
            Self::NotReady => "device not ready",
            Self::ArgumentError => "argument error",
            Self::InvalidAxis => "invalid axis",
            Self::InvalidHandle => "invalid handle",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Fault raised by a [`StageDriver`](crate::StageDriver) call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverFault {
    /// The device reported a non-success status code.
    #[error("driver status: {0}")]
    Status(DriverStatusCode),

    /// Communication with the device failed outside the status-code protocol.
    #[error("driver communication: {0}")]
    Comm(String),
}

impl DriverFault {
    /// The decoded status code, when this fault carries one.
    pub fn status(&self) -> Option<DriverStatusCode> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Comm(_) => None,
        }
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverFault>;

bitflags! {
    /// Limit-switch and move-status register (7 bits).
    ///
    /// One forward and one reverse limit switch per motor, plus a
    /// success/failure bit for the most recent move.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LimitStatus: u16 {
        /// M1 (x) reverse limit switch engaged.
        const M1_REVERSE = 1 << 0;
        /// M1 (x) forward limit switch engaged.
        const M1_FORWARD = 1 << 1;
        /// M2 (y) reverse limit switch engaged.
        const M2_REVERSE = 1 << 2;
        /// M2 (y) forward limit switch engaged.
        const M2_FORWARD = 1 << 3;
        /// M3 (z) reverse limit switch engaged.
        const M3_REVERSE = 1 << 4;
        /// M3 (z) forward limit switch engaged.
        const M3_FORWARD = 1 << 5;
        /// Last move completed successfully.
        const MOVE_OK = 1 << 6;

        /// All limit-switch bits.
        const ANY_LIMIT = Self::M1_REVERSE.bits() | Self::M1_FORWARD.bits()
            | Self::M2_REVERSE.bits() | Self::M2_FORWARD.bits()
            | Self::M3_REVERSE.bits() | Self::M3_FORWARD.bits();
    }
}

impl LimitStatus {
    /// Whether any limit switch is engaged.
    pub fn any_limit_engaged(&self) -> bool {
        self.intersects(Self::ANY_LIMIT)
    }
}

/// Step rounding mode for commanded distances.
///
/// Wire encoding follows the MicroDrive convention: 0 = nearest microstep,
/// 1 = nearest full step, 2 = nearest half step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rounding {
    /// Round the commanded distance to the nearest microstep.
    NearestMicrostep,
    /// Round the commanded distance to the nearest full step.
    NearestFullStep,
    /// Round the commanded distance to the nearest half step.
    NearestHalfStep,
}

impl Rounding {
    /// The raw wire code for this rounding mode.
    pub fn code(&self) -> i32 {
        match self {
            Self::NearestMicrostep => 0,
            Self::NearestFullStep => 1,
            Self::NearestHalfStep => 2,
        }
    }
}

/// One relative move request, ephemeral for the duration of a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand {
    /// Per-axis relative displacement in mm.
    pub displacement_mm: Vector3<f64>,
    /// Move velocity in mm/s, shared by all commanded axes.
    pub velocity_mm_s: f64,
    /// Step rounding applied to each axis distance.
    pub rounding: Rounding,
}
