//! Access events and the broker's outbound stream items.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::DeviceId;

/// Known inbound command tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// A card was presented at a reader.
    AccessEvent,
}

impl Command {
    /// Look up a command by its wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "access_event" => Some(Self::AccessEvent),
            _ => None,
        }
    }

    /// Wire tag for this command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessEvent => "access_event",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Passage direction reported by a device.
///
/// `in`/`out` are recognized case-insensitively; anything else passes
/// through untouched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Direction {
    /// Entering.
    In,
    /// Leaving.
    Out,
    /// Unrecognized value, kept verbatim (may be empty).
    Other(String),
}

impl Direction {
    /// Parse a wire value.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("in") {
            Self::In
        } else if raw.eq_ignore_ascii_case("out") {
            Self::Out
        } else {
            Self::Other(raw.to_owned())
        }
    }

    /// Wire form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Other(s) => s,
        }
    }

    /// Human label used in stored log rows (`In` / `Out`).
    pub fn label(&self) -> &str {
        match self {
            Self::In => "In",
            Self::Out => "Out",
            Self::Other(s) => s,
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for Direction {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Direction> for String {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded inbound access record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Command tag.
    pub command: Command,
    /// Claimed device identity, whitespace-trimmed. May be empty.
    pub device_serial: String,
    /// Presented card.
    pub card_number: String,
    /// Passage direction.
    pub direction: Direction,
    /// Unit number (free-form).
    pub unit_number: String,
    /// Vehicle plate (free-form).
    pub plate_number: String,
    /// Permission decision reported by the device.
    pub permission: String,
    /// Epoch seconds, if the device supplied one.
    pub timestamp: Option<i64>,
    /// Original key/value map as received.
    pub raw: Map<String, Value>,
}

impl AccessEvent {
    /// Build an event with empty optional fields.
    pub fn new(
        device_serial: impl Into<String>,
        card_number: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            command: Command::AccessEvent,
            device_serial: device_serial.into(),
            card_number: card_number.into(),
            direction,
            unit_number: String::new(),
            plate_number: String::new(),
            permission: String::new(),
            timestamp: None,
            raw: Map::new(),
        }
    }

    /// Device identity, if the serial is non-blank.
    pub fn device_id(&self) -> Option<DeviceId> {
        DeviceId::parse(&self.device_serial)
    }

    /// Device timestamp, or `now` when absent.
    pub fn timestamp_or(&self, now: i64) -> i64 {
        self.timestamp.unwrap_or(now)
    }

    /// Look up an extra key preserved from the wire (e.g. `site_code`).
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }
}

/// Item on the broker's outbound stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// A decoded access event from some session.
    Access(AccessEvent),
    /// The set of connected devices changed; carries the full new set.
    PresenceChanged(BTreeSet<DeviceId>),
}

impl BrokerEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Access(_) => "access",
            Self::PresenceChanged(_) => "presence_changed",
        }
    }
}
