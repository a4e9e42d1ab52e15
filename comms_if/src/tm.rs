//! # Telemetry
//!
//! Telemetry is published by the robot on a best-effort basis. Each packet is rebuilt from scratch
//! on the robot and replaces the previous packet wholesale on the receiver, nothing is merged.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use std::collections::HashMap;

use crate::tc::{ButtonAction, RobotMode};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry packet published by the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmPacket {
    /// Time the packet was built, seconds since the unix epoch
    pub timestamp: f64,

    /// Current robot mode
    pub mode: RobotMode,

    /// Seconds since the current mode was entered, `None` while stopped
    #[serde(default)]
    pub match_time_s: Option<f64>,

    /// True once TELEOP has run past its nominal duration
    #[serde(default)]
    pub overtime: bool,

    /// Last motor speeds handed to the actuators, `[FL, FR, RL, RR]`
    pub motor_speeds: [f64; 4],

    /// True if the last kinematics output had to be scaled down
    #[serde(default)]
    pub normalised: bool,

    /// Battery reading, opaque to the robot core
    #[serde(default)]
    pub battery: Option<f64>,

    /// Raw sensor readings, opaque to the robot core
    #[serde(default)]
    pub sensors: HashMap<String, serde_json::Value>,

    /// Whether the robot is in safe mode
    #[serde(default)]
    pub safe: bool,

    /// Why the robot is in safe mode, if it is
    #[serde(default)]
    pub safe_cause: Option<String>,

    /// The most recent button event received
    #[serde(default)]
    pub last_button: Option<ButtonEvent>
}

/// A button event, as remembered for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonEvent {
    pub id: u32,
    pub action: ButtonAction
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmPacket {
    /// Serialise the packet to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a packet from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_minimal_packet_parses() {
        // Only the fields every producer is guaranteed to send
        let json = r#"{"timestamp": 12.5, "mode": "AUTO", "motor_speeds": [0, 0, 0, 0]}"#;

        let tm = TmPacket::from_json(json).unwrap();

        assert_eq!(tm.mode, RobotMode::Auto);
        assert_eq!(tm.motor_speeds, [0.0; 4]);
        assert!(tm.sensors.is_empty());
        assert!(!tm.safe);
        assert_eq!(tm.battery, None);
    }

    #[test]
    fn test_packet_fields_on_wire() {
        let mut sensors = HashMap::new();
        sensors.insert("imu_yaw".to_string(), serde_json::json!(0.25));

        let tm = TmPacket {
            timestamp: 1.0,
            mode: RobotMode::Teleop,
            match_time_s: Some(3.0),
            overtime: false,
            motor_speeds: [0.5; 4],
            normalised: false,
            battery: Some(12.1),
            sensors,
            safe: false,
            safe_cause: None,
            last_button: Some(ButtonEvent { id: 3, action: ButtonAction::Down })
        };

        let val: serde_json::Value = serde_json::from_str(&tm.to_json().unwrap()).unwrap();

        assert_eq!(val["mode"], "TELEOP");
        assert_eq!(val["battery"], 12.1);
        assert_eq!(val["sensors"]["imu_yaw"], 0.25);
        assert_eq!(val["last_button"]["action"], "DOWN");
    }
}
