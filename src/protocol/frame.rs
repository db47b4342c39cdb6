//! Line-oriented frame codec.
//!
//! Inbound: `SMS_START:{json}:SMS_END`
//! Outbound: `CMD_START:{json}:CMD_END\r\n`

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FrameError;

pub const FRAME_START: &str = "SMS_START:";
pub const FRAME_END: &str = ":SMS_END";
pub const COMMAND_START: &str = "CMD_START:";
pub const COMMAND_END: &str = ":CMD_END";
pub const LINE_TERMINATOR: &str = "\r\n";

/// Bare lines the firmware prints outside of frames.
const FIRMWARE_LITERALS: &[&str] = &["system_ready", "heartbeat", "LuatOS", "RDY"];

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub msg_type: String,
    pub payload: Map<String, Value>,
    /// Inner JSON text exactly as received.
    pub json: String,
}

impl ParsedMessage {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn num_field(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }
}

/// Outbound command ready to be written to the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub bytes: Vec<u8>,
    pub json: String,
}

fn inner_frame(line: &str) -> Option<&str> {
    line.strip_prefix(FRAME_START)?.strip_suffix(FRAME_END)
}

/// Decode one line. Never panics; every input maps to a message or an error.
pub fn parse_frame(line: &str) -> Result<ParsedMessage, FrameError> {
    let inner = inner_frame(line.trim()).ok_or(FrameError::NotAFrame)?;

    let value: Value = serde_json::from_str(inner)
        .map_err(|err| FrameError::MalformedPayload(err.to_string()))?;
    let Value::Object(payload) = value else {
        return Err(FrameError::MalformedPayload(
            "payload is not a JSON object".into(),
        ));
    };

    let msg_type = match payload.get("type").and_then(Value::as_str) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => return Err(FrameError::MissingDiscriminator),
    };

    Ok(ParsedMessage {
        msg_type,
        payload,
        json: inner.to_string(),
    })
}

/// Wrap any serializable command in a `CMD_START`/`CMD_END` frame.
pub fn build_command<T: Serialize + ?Sized>(fields: &T) -> Result<CommandFrame, serde_json::Error> {
    let json = serde_json::to_string(fields)?;
    let bytes = format!("{COMMAND_START}{json}{COMMAND_END}{LINE_TERMINATOR}").into_bytes();
    Ok(CommandFrame { bytes, json })
}

/// Inner JSON of an outbound command line, if it is one.
pub fn unwrap_command(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix(COMMAND_START)?
        .strip_suffix(COMMAND_END)
}

/// Whether a line is recognizable device traffic, as opposed to garbage.
///
/// Used only to pick a log level for lines that do not decode as frames.
pub fn is_valid_response(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    if inner_frame(line).is_some() {
        return true;
    }
    if line.starts_with('{')
        && matches!(serde_json::from_str::<Value>(line), Ok(Value::Object(_)))
    {
        return true;
    }
    FIRMWARE_LITERALS.iter().any(|lit| line.contains(lit))
}
