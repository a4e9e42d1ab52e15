//! # JSON codec
//!
//! Telecommands are JSON objects tagged by their `"type"`, for example
//! `{"type": "joystick", "timestamp": 1.2, "lx": 0.0, "ly": 0.5, "rx": 0.0, "ry": 0.0}`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde_json::{json, Map, Value};
use std::convert::TryFrom;

use crate::tc::{
    AxisFrame, ButtonAction, RobotMode, Tc, TcPacket, TcParseError, TcResponse, TcStatus, TcType
};
use super::{Binding, ResponseParseError, WireCodec};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Codec for the structured message binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WireCodec for JsonCodec {
    fn binding(&self) -> Binding {
        Binding::Json
    }

    fn encode_tc(&self, packet: &TcPacket) -> Vec<u8> {
        let mut val = match packet.tc {
            Tc::Ping => json!({}),
            Tc::Joystick(frame) => json!({
                "lx": frame.lx,
                "ly": frame.ly,
                "rx": frame.rx,
                "ry": frame.ry
            }),
            Tc::Button { id, action } => json!({
                "button_id": id,
                "action": action.as_str()
            }),
            Tc::SetMode(mode) => json!({ "mode": mode.as_str() }),
            Tc::Reset => json!({})
        };

        val["type"] = json!(packet.tc.tc_type().json_tag());
        if let Some(ts) = packet.timestamp_s {
            val["timestamp"] = json!(ts);
        }

        val.to_string().into_bytes()
    }

    fn decode_tc(&self, bytes: &[u8]) -> Result<TcPacket, TcParseError> {
        let json_str = std::str::from_utf8(bytes)
            .map_err(|_| TcParseError::NonUtf8)?;

        if json_str.trim().is_empty() {
            return Err(TcParseError::Empty)
        }

        // Parse the JSON string into a value
        let val: Value = serde_json::from_str(json_str)
            .map_err(|e| TcParseError::InvalidJson(e))?;

        // Get the type of the TC
        let tag = match val.get("type").and_then(|t| t.as_str()) {
            Some(s) => s,
            None => return Err(TcParseError::MissingType)
        };
        let tc_type = TcType::from_json_tag(tag)
            .ok_or_else(|| TcParseError::UnknownType(tag.to_string()))?;

        let tc = match tc_type {
            TcType::Ping => Tc::Ping,
            TcType::Joystick => Tc::Joystick(AxisFrame {
                lx: f64_field(&val, tc_type, "lx")?,
                ly: f64_field(&val, tc_type, "ly")?,
                rx: f64_field(&val, tc_type, "rx")?,
                ry: f64_field(&val, tc_type, "ry")?
            }),
            TcType::Button => {
                let id_val = field(&val, tc_type, "button_id")?;
                let id = id_val.as_u64()
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| invalid(tc_type, "button_id", id_val))?;

                Tc::Button {
                    id,
                    action: str_field(&val, tc_type, "action")?.parse::<ButtonAction>()?
                }
            },
            TcType::Mode => Tc::SetMode(str_field(&val, tc_type, "mode")?.parse::<RobotMode>()?),
            TcType::Reset => Tc::Reset
        };

        Ok(TcPacket {
            timestamp_s: val.get("timestamp").and_then(|t| t.as_f64()),
            tc
        })
    }

    fn encode_response(&self, response: &TcResponse) -> Vec<u8> {
        let mut map = Map::new();

        map.insert("status".into(), json!(match response.status {
            TcStatus::Success => "success",
            TcStatus::Error => "error"
        }));
        if let Some(ref msg) = response.message {
            map.insert("message".into(), json!(msg));
        }
        if let Some(mode) = response.mode {
            map.insert("mode".into(), json!(mode.as_str()));
        }
        if let Some(ts) = response.timestamp {
            map.insert("timestamp".into(), json!(ts));
        }
        if let Some(kind) = response.error {
            // The serde form of the kind is a plain string so this cannot fail
            if let Ok(v) = serde_json::to_value(kind) {
                map.insert("error".into(), v);
            }
        }

        Value::Object(map).to_string().into_bytes()
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<TcResponse, ResponseParseError> {
        let json_str = std::str::from_utf8(bytes)
            .map_err(|_| ResponseParseError::NonUtf8)?;

        serde_json::from_str(json_str)
            .map_err(|e| ResponseParseError::InvalidJson(e))
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn field<'a>(
    val: &'a Value,
    tc_type: TcType,
    name: &'static str
) -> Result<&'a Value, TcParseError> {
    match val.get(name) {
        Some(Value::Null) | None => Err(TcParseError::MissingField(tc_type, name)),
        Some(v) => Ok(v)
    }
}

fn f64_field(val: &Value, tc_type: TcType, name: &'static str) -> Result<f64, TcParseError> {
    let v = field(val, tc_type, name)?;
    v.as_f64().ok_or_else(|| invalid(tc_type, name, v))
}

fn str_field<'a>(
    val: &'a Value,
    tc_type: TcType,
    name: &'static str
) -> Result<&'a str, TcParseError> {
    let v = field(val, tc_type, name)?;
    v.as_str().ok_or_else(|| invalid(tc_type, name, v))
}

fn invalid(tc_type: TcType, field: &'static str, value: &Value) -> TcParseError {
    TcParseError::InvalidField {
        tc_type,
        field,
        value: value.to_string()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
