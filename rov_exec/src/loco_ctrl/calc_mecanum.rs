//! Mecanum drive calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::tc::AxisFrame;

use super::{StatusReport, NUM_DRV_AXES};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest magnitude any wheel may be driven at.
pub const MAX_DRV_SPEED: f64 = 1.0;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Raw wheel speeds `[FL, FR, RL, RR]` for a joystick frame, before normalisation.
///
/// `ly` drives forwards, `lx` strafes and `rx` rotates. `ry` is not used.
pub fn calc_mecanum(frame: &AxisFrame) -> [f64; NUM_DRV_AXES] {
    let AxisFrame { lx, ly, rx, .. } = *frame;

    [
        ly + lx + rx,
        ly - lx - rx,
        ly - lx + rx,
        ly + lx - rx
    ]
}

/// Scale the speeds down uniformly so none exceeds [`MAX_DRV_SPEED`].
///
/// Speeds already within the limit are returned unchanged. Scaling preserves the ratios between
/// wheels so the direction of motion is kept.
pub fn normalise(raw: [f64; NUM_DRV_AXES]) -> ([f64; NUM_DRV_AXES], StatusReport) {
    let max = raw.iter().fold(0.0f64, |m, s| m.max(s.abs()));

    if max <= MAX_DRV_SPEED {
        return (raw, StatusReport::default())
    }

    let scale = MAX_DRV_SPEED / max;
    let mut out = raw;
    for s in out.iter_mut() {
        *s *= scale;
    }

    (out, StatusReport { normalised: true, scale })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
