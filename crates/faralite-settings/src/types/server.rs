//! Server, storage and logging settings.

use faralite_core::OverflowPolicy;
use serde::{Deserialize, Serialize};

/// Ingestion server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Maximum simultaneous device connections.
    pub max_connections: usize,
    /// Largest accepted frame, in bytes.
    pub max_message_size: usize,
    /// Capacity of the broker's outbound event stream.
    pub event_channel_capacity: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_queue_capacity: usize,
    /// Behavior of a full outbound queue.
    pub overflow_policy: OverflowPolicy,
    /// Seconds between WebSocket pings.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Shared token devices must present. `None` accepts any peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Expose `GET /metrics`.
    pub metrics_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            max_connections: 1024,
            max_message_size: 64 * 1024,
            event_channel_capacity: 1024,
            outbound_queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            auth_token: None,
            metrics_enabled: true,
        }
    }
}

/// Storage location. A relative path resolves against the data directory
/// (`~/.faralite`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// `SQLite` database file.
    pub db_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "faralite.db".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
