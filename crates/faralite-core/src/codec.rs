//! Wire codec: one JSON object per frame.
//!
//! Decoding is lenient about field types (numbers and booleans in text
//! fields are stringified) and strict only about the command tag.

use serde_json::{Map, Value};

use crate::events::{AccessEvent, Command, Direction};

/// Key carrying the command tag.
pub const COMMAND_KEY: &str = "command";
/// Legacy alias for [`COMMAND_KEY`].
pub const COMMAND_ALIAS_KEY: &str = "cmd";

/// Why a frame was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Binary frame payload is not UTF-8.
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    /// Frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// No `command` (or `cmd`) key.
    #[error("missing command")]
    MissingCommand,
    /// Command tag is not one we know.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl DecodeError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::NotUtf8 => "not_utf8",
            Self::NotAnObject => "not_an_object",
            Self::MissingCommand => "missing_command",
            Self::UnknownCommand(_) => "unknown_command",
        }
    }
}

/// Decode a text frame.
pub fn decode(frame: &str) -> Result<AccessEvent, DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    let Value::Object(map) = value else {
        return Err(DecodeError::NotAnObject);
    };
    from_map(map)
}

/// Decode a binary frame holding UTF-8 JSON.
pub fn decode_bytes(frame: &[u8]) -> Result<AccessEvent, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotUtf8)?;
    decode(text)
}

fn from_map(map: Map<String, Value>) -> Result<AccessEvent, DecodeError> {
    let tag = match map.get(COMMAND_KEY).or_else(|| map.get(COMMAND_ALIAS_KEY)) {
        None | Some(Value::Null) => return Err(DecodeError::MissingCommand),
        Some(Value::String(s)) => s.as_str(),
        Some(other) => return Err(DecodeError::UnknownCommand(other.to_string())),
    };
    let command = Command::from_tag(tag)
        .ok_or_else(|| DecodeError::UnknownCommand(tag.to_owned()))?;

    Ok(AccessEvent {
        command,
        device_serial: text_field(&map, "device_serial").trim().to_owned(),
        card_number: text_field(&map, "card_number"),
        direction: Direction::parse(&text_field(&map, "direction")),
        unit_number: text_field(&map, "unit_number"),
        plate_number: text_field(&map, "plate_number"),
        permission: text_field(&map, "permission"),
        timestamp: map.get("timestamp").and_then(epoch_seconds),
        raw: map,
    })
}

fn text_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Encode an event in canonical wire form.
///
/// Extra keys from `raw` are kept; canonical fields overwrite them.
pub fn encode(event: &AccessEvent) -> String {
    let mut map = event.raw.clone();
    let _ = map.remove(COMMAND_ALIAS_KEY);
    let fields = [
        (COMMAND_KEY, event.command.as_str()),
        ("device_serial", event.device_serial.as_str()),
        ("card_number", event.card_number.as_str()),
        ("direction", event.direction.as_str()),
        ("unit_number", event.unit_number.as_str()),
        ("plate_number", event.plate_number.as_str()),
        ("permission", event.permission.as_str()),
    ];
    for (key, value) in fields {
        let _ = map.insert(key.to_owned(), Value::String(value.to_owned()));
    }
    match event.timestamp {
        Some(ts) => {
            let _ = map.insert("timestamp".to_owned(), Value::from(ts));
        }
        None => {
            let _ = map.remove("timestamp");
        }
    }
    Value::Object(map).to_string()
}
