//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity a device announces in its first event (`device_serial`).
///
/// Opaque; the only requirement is that it is non-empty after trimming.
/// Deserialization goes through [`DeviceId::parse`].
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DeviceId(String);

/// A blank device identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device identifier is blank")]
pub struct BlankDeviceId;

impl DeviceId {
    /// Parse a device identifier, rejecting blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = BlankDeviceId;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or(BlankDeviceId)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-assigned identifier for one transport connection.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh, time-ordered connection ID.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Wrap an existing value.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_trims_whitespace() {
        let id = DeviceId::parse("  DEV1 ").unwrap();
        assert_eq!(id.as_str(), "DEV1");
    }

    #[test]
    fn device_id_rejects_blank() {
        assert!(DeviceId::parse("").is_none());
        assert!(DeviceId::parse("   ").is_none());
    }

    #[test]
    fn device_ids_order_lexically() {
        let a = DeviceId::parse("A").unwrap();
        let b = DeviceId::parse("B").unwrap();
        assert!(a < b);
    }

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn device_id_serializes_transparently() {
        let id = DeviceId::parse("DEV123456").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"DEV123456\"");
    }

    #[test]
    fn device_id_deserializes_through_parse() {
        let id: DeviceId = serde_json::from_str("\" GATE-2 \"").unwrap();
        assert_eq!(id.as_str(), "GATE-2");
        assert!(serde_json::from_str::<DeviceId>("\"   \"").is_err());
        assert!(serde_json::from_str::<Vec<DeviceId>>(r#"["A", ""]"#).is_err());
    }
}
