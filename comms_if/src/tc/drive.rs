//! # Drive telecommand payloads

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use std::str::FromStr;

use super::{TcParseError, TcType};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One sample of the operator's joystick axes.
///
/// Each axis is normalised to [-1, 1] by the input source before it reaches the protocol. Positive
/// `ly`/`ry` is stick forwards, positive `lx`/`rx` is stick right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisFrame {
    /// Left stick, horizontal axis. Strafe demand.
    pub lx: f64,

    /// Left stick, vertical axis. Forward demand.
    pub ly: f64,

    /// Right stick, horizontal axis. Rotation demand.
    pub rx: f64,

    /// Right stick, vertical axis. Not used by the drive.
    pub ry: f64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction of a button event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ButtonAction {
    Down,
    Up
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AxisFrame {
    pub fn new(lx: f64, ly: f64, rx: f64, ry: f64) -> Self {
        Self { lx, ly, rx, ry }
    }

    /// The axes in `[lx, ly, rx, ry]` order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.lx, self.ly, self.rx, self.ry]
    }

    /// Returns true if every axis is a finite number.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|a| a.is_finite())
    }

    /// Return a copy of the frame with every axis limited to [-1, 1].
    pub fn clamped(&self) -> Self {
        Self {
            lx: self.lx.max(-1.0).min(1.0),
            ly: self.ly.max(-1.0).min(1.0),
            rx: self.rx.max(-1.0).min(1.0),
            ry: self.ry.max(-1.0).min(1.0)
        }
    }

    /// The largest absolute change of any single axis between this frame and `other`.
    pub fn max_axis_delta(&self, other: &AxisFrame) -> f64 {
        let a = self.to_array();
        let b = other.to_array();

        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }
}

impl ButtonAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonAction::Down => "DOWN",
            ButtonAction::Up => "UP"
        }
    }
}

impl FromStr for ButtonAction {
    type Err = TcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DOWN" => Ok(ButtonAction::Down),
            "UP" => Ok(ButtonAction::Up),
            _ => Err(TcParseError::InvalidField {
                tc_type: TcType::Button,
                field: "action",
                value: s.to_string()
            })
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        let frame = AxisFrame::new(1.5, -2.0, 0.25, -1.0).clamped();
        assert_eq!(frame, AxisFrame::new(1.0, -1.0, 0.25, -1.0));
    }

    #[test]
    fn test_finite() {
        assert!(AxisFrame::new(0.0, 1.0, -1.0, 0.5).is_finite());
        assert!(!AxisFrame::new(f64::NAN, 0.0, 0.0, 0.0).is_finite());
        assert!(!AxisFrame::new(0.0, 0.0, f64::INFINITY, 0.0).is_finite());
    }

    #[test]
    fn test_max_axis_delta() {
        let a = AxisFrame::new(0.0, 0.5, 0.0, 0.0);
        let b = AxisFrame::new(0.005, 0.5, -0.2, 0.0);
        assert!((a.max_axis_delta(&b) - 0.2).abs() < 1e-12);
        assert_eq!(a.max_axis_delta(&a), 0.0);
    }

    #[test]
    fn test_button_action_from_str() {
        assert_eq!("DOWN".parse::<ButtonAction>().unwrap(), ButtonAction::Down);
        assert_eq!("up".parse::<ButtonAction>().unwrap(), ButtonAction::Up);
        assert!("SIDEWAYS".parse::<ButtonAction>().is_err());
    }
}
