//! # Line codec
//!
//! One telecommand per text line:
//!
//! ```text
//! PING
//! JOYSTICKS <lx>,<ly>,<rx>,<ry>
//! BTN <id> <DOWN|UP>
//! MODE <AUTO|TELEOP|STOPPED>
//! RESET
//! ```
//!
//! The robot answers every line with `ACK`, or `ERR <message>` if the line was rejected. The
//! binding carries no timestamps.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::tc::{
    AxisFrame, ButtonAction, RobotMode, Tc, TcPacket, TcParseError, TcResponse, TcStatus, TcType
};
use super::{Binding, ResponseParseError, WireCodec};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const ACK: &str = "ACK";

const ERR_PREFIX: &str = "ERR";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Codec for the line-text binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LineCodec {
    /// Parse a single line of text into a telecommand.
    pub fn parse_line(&self, line: &str) -> Result<TcPacket, TcParseError> {
        let line = line.trim();

        if line.is_empty() {
            return Err(TcParseError::Empty)
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let tag = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        let tc_type = TcType::from_line_tag(&tag.to_ascii_uppercase())
            .ok_or_else(|| TcParseError::UnknownType(tag.to_string()))?;

        let tc = match tc_type {
            TcType::Ping => Tc::Ping,
            TcType::Reset => Tc::Reset,
            TcType::Joystick => Tc::Joystick(parse_axes(rest)?),
            TcType::Button => {
                let mut args = rest.split_whitespace();

                let id_str = args.next()
                    .ok_or(TcParseError::MissingField(tc_type, "button_id"))?;
                let id = id_str.parse::<u32>()
                    .map_err(|_| TcParseError::InvalidField {
                        tc_type,
                        field: "button_id",
                        value: id_str.to_string()
                    })?;

                let action = args.next()
                    .ok_or(TcParseError::MissingField(tc_type, "action"))?
                    .parse::<ButtonAction>()?;

                Tc::Button { id, action }
            },
            TcType::Mode => {
                if rest.is_empty() {
                    return Err(TcParseError::MissingField(tc_type, "mode"))
                }
                Tc::SetMode(rest.parse::<RobotMode>()?)
            }
        };

        Ok(TcPacket {
            timestamp_s: None,
            tc
        })
    }

    /// Format a telecommand as a single line of text, without the trailing newline.
    pub fn format_tc(&self, tc: &Tc) -> String {
        let tag = tc.tc_type().line_tag();

        match tc {
            Tc::Ping | Tc::Reset => tag.to_string(),
            Tc::Joystick(f) => format!("{} {},{},{},{}", tag, f.lx, f.ly, f.rx, f.ry),
            Tc::Button { id, action } => format!("{} {} {}", tag, id, action.as_str()),
            Tc::SetMode(mode) => format!("{} {}", tag, mode.as_str())
        }
    }
}

impl WireCodec for LineCodec {
    fn binding(&self) -> Binding {
        Binding::Line
    }

    fn encode_tc(&self, packet: &TcPacket) -> Vec<u8> {
        self.format_tc(&packet.tc).into_bytes()
    }

    fn decode_tc(&self, bytes: &[u8]) -> Result<TcPacket, TcParseError> {
        let line = std::str::from_utf8(bytes)
            .map_err(|_| TcParseError::NonUtf8)?;

        self.parse_line(line)
    }

    fn encode_response(&self, response: &TcResponse) -> Vec<u8> {
        match response.status {
            TcStatus::Success => ACK.as_bytes().to_vec(),
            TcStatus::Error => {
                // Newlines would break the framing
                let msg = response.message.as_deref()
                    .unwrap_or("rejected")
                    .replace(|c: char| c == '\n' || c == '\r', " ");
                format!("{} {}", ERR_PREFIX, msg).into_bytes()
            }
        }
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<TcResponse, ResponseParseError> {
        let line = std::str::from_utf8(bytes)
            .map_err(|_| ResponseParseError::NonUtf8)?
            .trim();

        if line == ACK {
            return Ok(TcResponse::success())
        }

        match line.strip_prefix(ERR_PREFIX) {
            Some(msg) if msg.is_empty() || msg.starts_with(' ') => Ok(TcResponse {
                status: TcStatus::Error,
                message: Some(msg.trim().to_string()),
                mode: None,
                timestamp: None,
                error: None
            }),
            _ => Err(ResponseParseError::Unrecognised(line.to_string()))
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn parse_axes(args: &str) -> Result<AxisFrame, TcParseError> {
    if args.is_empty() {
        return Err(TcParseError::MissingField(TcType::Joystick, "axes"))
    }

    let invalid = || TcParseError::InvalidField {
        tc_type: TcType::Joystick,
        field: "axes",
        value: args.to_string()
    };

    let axes = args.split(',')
        .map(|a| a.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|_| invalid())?;

    match axes.as_slice() {
        [lx, ly, rx, ry] => Ok(AxisFrame::new(*lx, *ly, *rx, *ry)),
        _ => Err(invalid())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
