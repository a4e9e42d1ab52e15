//! # Telecommand module
//!
//! This module provides telecommand functionality to the communications interface. A telecommand
//! (TC) is one instruction sent by the driver station to the robot. Every TC is answered by exactly
//! one [`TcResponse`].
//!
//! The types here are independent of the wire format, see [`crate::codec`] for the adapters which
//! turn them into bytes.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod drive;
mod mode;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use thiserror::Error;

// Re-exports
pub use drive::*;
pub use mode::*;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A telecommand together with the envelope it arrived in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcPacket {
    /// The sender's timestamp in seconds since the unix epoch, if the binding carries one.
    pub timestamp_s: Option<f64>,

    /// The telecommand itself
    pub tc: Tc
}

/// Response from the robot to a single telecommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcResponse {
    /// Whether the telecommand was accepted
    pub status: TcStatus,

    /// Human readable detail, always present on errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The robot's mode after the telecommand was executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RobotMode>,

    /// Timestamp echoed back to the sender (pings only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,

    /// Classification of the error, if the status is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TcErrorKind>
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// A telecommand, i.e. an instruction sent to the robot by the driver station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tc {
    /// Liveness probe, answered immediately.
    Ping,

    /// A new sample of the operator's joystick axes.
    Joystick(AxisFrame),

    /// A discrete button event.
    Button {
        id: u32,
        action: ButtonAction
    },

    /// Change the robot's operating mode.
    SetMode(RobotMode),

    /// Return the robot to `Stopped` and zero the motors.
    Reset
}

/// Telecommand types.
///
/// The type is the tag which identifies the telecommand on the wire, and is known before the rest
/// of the telecommand has been parsed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TcType {
    Ping,
    Joystick,
    Button,
    Mode,
    Reset
}

/// Whether a telecommand succeeded.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcStatus {
    Success,
    Error
}

/// The class of a rejected telecommand.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TcErrorKind {
    /// The payload could not be parsed
    Malformed,

    /// The payload parsed but its type tag is not known
    UnknownCommand,

    /// The telecommand was understood but one of its values is not acceptable
    Validation
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC is not valid UTF-8")]
    NonUtf8,

    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("TC is empty")]
    Empty,

    #[error("TC does not have a type")]
    MissingType,

    #[error("{0:?} is not a recognised TC type")]
    UnknownType(String),

    #[error("TC of type {0:?} is missing the {1:?} field")]
    MissingField(TcType, &'static str),

    #[error("TC of type {tc_type:?} has an invalid {field:?} field ({value})")]
    InvalidField {
        tc_type: TcType,
        field: &'static str,
        value: String
    },

    #[error("{0:?} is not a valid robot mode")]
    InvalidMode(String)
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl TcPacket {
    /// Wrap a telecommand, stamping it with the current time.
    pub fn new(tc: Tc) -> Self {
        Self {
            timestamp_s: Some(timestamp_now_s()),
            tc
        }
    }
}

impl Tc {
    /// Get the type tag of this telecommand.
    pub fn tc_type(&self) -> TcType {
        match self {
            Tc::Ping => TcType::Ping,
            Tc::Joystick(_) => TcType::Joystick,
            Tc::Button { .. } => TcType::Button,
            Tc::SetMode(_) => TcType::Mode,
            Tc::Reset => TcType::Reset
        }
    }
}

impl TcType {
    /// The tag used for this type by the structured (JSON) binding.
    pub fn json_tag(&self) -> &'static str {
        match self {
            TcType::Ping => "ping",
            TcType::Joystick => "joystick",
            TcType::Button => "button",
            TcType::Mode => "mode",
            TcType::Reset => "reset"
        }
    }

    /// The leading keyword used for this type by the line binding.
    pub fn line_tag(&self) -> &'static str {
        match self {
            TcType::Ping => "PING",
            TcType::Joystick => "JOYSTICKS",
            TcType::Button => "BTN",
            TcType::Mode => "MODE",
            TcType::Reset => "RESET"
        }
    }

    pub fn from_json_tag(s: &str) -> Option<Self> {
        match s {
            "ping" => Some(TcType::Ping),
            "joystick" => Some(TcType::Joystick),
            "button" => Some(TcType::Button),
            "mode" => Some(TcType::Mode),
            "reset" => Some(TcType::Reset),
            _ => None
        }
    }

    pub fn from_line_tag(s: &str) -> Option<Self> {
        match s {
            "PING" => Some(TcType::Ping),
            "JOYSTICKS" => Some(TcType::Joystick),
            "BTN" => Some(TcType::Button),
            "MODE" => Some(TcType::Mode),
            "RESET" => Some(TcType::Reset),
            _ => None
        }
    }
}

impl TcResponse {
    /// A bare success response.
    pub fn success() -> Self {
        Self {
            status: TcStatus::Success,
            message: None,
            mode: None,
            timestamp: None,
            error: None
        }
    }

    /// An error response of the given kind.
    pub fn error<S: Into<String>>(kind: TcErrorKind, message: S) -> Self {
        Self {
            status: TcStatus::Error,
            message: Some(message.into()),
            mode: None,
            timestamp: None,
            error: Some(kind)
        }
    }

    pub fn with_mode(mut self, mode: RobotMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<f64>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TcStatus::Success
    }
}

impl TcParseError {
    /// Returns true if the envelope of the telecommand was understood even though its contents
    /// were not.
    ///
    /// A recoverable error still proves the sender is alive and talking the right protocol.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TcParseError::MissingField(..)
                | TcParseError::InvalidField { .. }
                | TcParseError::InvalidMode(_)
        )
    }

    /// The error class reported back to the sender.
    pub fn kind(&self) -> TcErrorKind {
        match self {
            TcParseError::UnknownType(_) => TcErrorKind::UnknownCommand,
            TcParseError::InvalidField { .. } | TcParseError::InvalidMode(_) =>
                TcErrorKind::Validation,
            _ => TcErrorKind::Malformed
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Current wall-clock time in seconds since the unix epoch, as used in TC and TM timestamps.
pub fn timestamp_now_s() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        let types = [TcType::Ping, TcType::Joystick, TcType::Button, TcType::Mode, TcType::Reset];

        for t in types.iter() {
            assert_eq!(TcType::from_json_tag(t.json_tag()), Some(*t));
            assert_eq!(TcType::from_line_tag(t.line_tag()), Some(*t));
        }

        assert_eq!(TcType::from_json_tag("PING"), None);
        assert_eq!(TcType::from_line_tag("ping"), None);
    }

    #[test]
    fn test_parse_error_classes() {
        assert_eq!(
            TcParseError::UnknownType("FOO".into()).kind(),
            TcErrorKind::UnknownCommand
        );
        assert_eq!(TcParseError::InvalidMode("FAST".into()).kind(), TcErrorKind::Validation);
        assert_eq!(TcParseError::Empty.kind(), TcErrorKind::Malformed);

        assert!(TcParseError::InvalidMode("FAST".into()).is_recoverable());
        assert!(TcParseError::MissingField(TcType::Button, "action").is_recoverable());
        assert!(!TcParseError::UnknownType("FOO".into()).is_recoverable());
        assert!(!TcParseError::NonUtf8.is_recoverable());
    }

    #[test]
    fn test_response_json_shape() {
        let resp = TcResponse::success().with_mode(RobotMode::Teleop);
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"status":"success","mode":"TELEOP"}"#);

        let err = TcResponse::error(TcErrorKind::UnknownCommand, "nope");
        let val: serde_json::Value = serde_json::to_value(&err).unwrap();
        assert_eq!(val["status"], "error");
        assert_eq!(val["error"], "unknown_command");
        assert_eq!(val["message"], "nope");
    }
}
