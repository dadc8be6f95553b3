//! Reference device client settings.

use serde::{Deserialize, Serialize};

/// Device client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    /// Broker WebSocket URL.
    pub server_url: String,
    /// Identity announced in every event.
    pub device_serial: String,
    /// Site code attached to every event.
    pub site_code: String,
    /// Milliseconds between simulated events.
    pub event_interval_ms: u64,
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// Reconnection behavior.
    pub reconnect: ReconnectSettings,
    /// Token sent as `Authorization: Bearer`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8765".to_string(),
            device_serial: "DEV123456".to_string(),
            site_code: "1".to_string(),
            event_interval_ms: 2000,
            queue_capacity: 256,
            reconnect: ReconnectSettings::default(),
            auth_token: None,
        }
    }
}

/// Exponential backoff between reconnection attempts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Give up after this many consecutive failures. `0` retries forever.
    pub max_attempts: u32,
    /// First delay.
    pub initial_backoff_ms: u64,
    /// Delay ceiling.
    pub max_backoff_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}
