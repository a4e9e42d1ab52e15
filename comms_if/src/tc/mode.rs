//! # Robot operating modes

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use std::{fmt, str::FromStr};

use super::TcParseError;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Operating mode of the robot.
///
/// Only the robot's copy is authoritative, the driver station holds a mirror of it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RobotMode {
    /// Motors held at zero. Initial mode and the target of a reset.
    Stopped,

    /// Autonomous period. Joystick input is computed but not actuated.
    Auto,

    /// Operator control. Joystick input drives the motors.
    Teleop
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RobotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotMode::Stopped => "STOPPED",
            RobotMode::Auto => "AUTO",
            RobotMode::Teleop => "TELEOP"
        }
    }
}

impl Default for RobotMode {
    fn default() -> Self {
        RobotMode::Stopped
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobotMode {
    type Err = TcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOPPED" => Ok(RobotMode::Stopped),
            "AUTO" => Ok(RobotMode::Auto),
            "TELEOP" => Ok(RobotMode::Teleop),
            _ => Err(TcParseError::InvalidMode(s.to_string()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("TELEOP".parse::<RobotMode>().unwrap(), RobotMode::Teleop);
        assert_eq!(" auto ".parse::<RobotMode>().unwrap(), RobotMode::Auto);
        assert_eq!("Stopped".parse::<RobotMode>().unwrap(), RobotMode::Stopped);

        match "TURBO".parse::<RobotMode>() {
            Err(TcParseError::InvalidMode(s)) => assert_eq!(s, "TURBO"),
            other => panic!("Expected InvalidMode, got {:?}", other)
        }
    }
}
