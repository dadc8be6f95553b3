//! Server configuration.

use std::net::Ipv6Addr;

use faralite_core::OverflowPolicy;
use faralite_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the ingestion server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent device connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Capacity of the outbound broker stream.
    pub event_channel_capacity: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_queue_capacity: usize,
    /// Full-queue behavior.
    pub overflow_policy: OverflowPolicy,
    /// Shared device token; `None` accepts any peer.
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            event_channel_capacity: 1024,
            outbound_queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            auth_token: None,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            max_message_size: s.max_message_size,
            event_channel_capacity: s.event_channel_capacity,
            outbound_queue_capacity: s.outbound_queue_capacity,
            overflow_policy: s.overflow_policy,
            auth_token: s.auth_token.clone().filter(|t| !t.is_empty()),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding. IPv6 literals are bracketed.
    pub fn bind_addr(&self) -> String {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
