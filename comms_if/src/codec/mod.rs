//! # Wire codecs
//!
//! Telecommands and their responses can travel over two different wire bindings:
//!
//! - `json`: each telecommand is one JSON object tagged by `"type"`, carried over a ZMQ REQ/REP
//!   pair, with telemetry published alongside it on a PUB socket.
//! - `line`: each telecommand is one newline-terminated text line (`PING`, `JOYSTICKS ...`, ...)
//!   over a plain TCP stream, answered by `ACK` or `ERR <message>`.
//!
//! Both bindings implement [`WireCodec`], so the dispatcher and the sessions never need to know
//! which one is in use.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod json;
mod line;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;

use crate::tc::{TcPacket, TcParseError, TcResponse};

pub use json::JsonCodec;
pub use line::LineCodec;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Converts telecommands and responses to and from wire bytes.
///
/// Encoded messages never include a frame delimiter, framing is the job of the transport.
pub trait WireCodec: Send + Sync {
    /// The binding this codec implements.
    fn binding(&self) -> Binding;

    fn encode_tc(&self, packet: &TcPacket) -> Vec<u8>;

    fn decode_tc(&self, bytes: &[u8]) -> Result<TcPacket, TcParseError>;

    fn encode_response(&self, response: &TcResponse) -> Vec<u8>;

    fn decode_response(&self, bytes: &[u8]) -> Result<TcResponse, ResponseParseError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The wire bindings a deployment can use.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    Json,
    Line
}

/// Errors which can occur while decoding a response from the robot.
#[derive(Debug, Error)]
pub enum ResponseParseError {
    #[error("Response is not valid UTF-8")]
    NonUtf8,

    #[error("Response contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Response was not recognised: {0:?}")]
    Unrecognised(String)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Binding {
    /// Get the codec for this binding.
    pub fn codec(&self) -> Arc<dyn WireCodec> {
        match self {
            Binding::Json => Arc::new(JsonCodec),
            Binding::Line => Arc::new(LineCodec)
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Json => f.write_str("json"),
            Binding::Line => f.write_str("line")
        }
    }
}

impl FromStr for Binding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Binding::Json),
            "line" => Ok(Binding::Line),
            _ => Err(format!("{:?} is not a known binding, expected \"json\" or \"line\"", s))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_binding_from_str() {
        assert_eq!("json".parse::<Binding>().unwrap(), Binding::Json);
        assert_eq!("LINE".parse::<Binding>().unwrap(), Binding::Line);
        assert!("carrier-pigeon".parse::<Binding>().is_err());
    }

    #[test]
    fn test_codec_matches_binding() {
        assert_eq!(Binding::Json.codec().binding(), Binding::Json);
        assert_eq!(Binding::Line.codec().binding(), Binding::Line);
    }
}
