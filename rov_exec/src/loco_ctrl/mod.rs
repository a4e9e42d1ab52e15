//! Locomotion control module
//!
//! Maps the operator's joystick axes onto the four wheels of a mecanum drive. Processing is a pure
//! function of the input frame, nothing is remembered between calls.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod calc_mecanum;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::{Serialize, Deserialize};

// Internal
use comms_if::{eqpt::mech::MechDems, tc::AxisFrame};
pub use calc_mecanum::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of drive axes on the robot.
pub const NUM_DRV_AXES: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Status report for LocoCtrl processing.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct StatusReport {
    /// True if the raw wheel speeds exceeded the limit and were scaled down.
    pub normalised: bool,

    /// Factor every raw speed was multiplied by, 1.0 if no scaling happened.
    pub scale: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            normalised: false,
            scale: 1.0
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Perform locomotion control processing on one joystick frame.
///
/// The frame is expected to be clamped to [-1, 1] already. Every wheel speed in the output is
/// within [-1, 1].
pub fn proc(frame: &AxisFrame) -> (MechDems, StatusReport) {
    let raw = calc_mecanum(frame);
    let (drv_speed, report) = normalise(raw);

    trace!(
        "LocoCtrl output: drv: {:?} (raw {:?}, scale {})",
        drv_speed, raw, report.scale
    );

    (MechDems { drv_speed }, report)
}
