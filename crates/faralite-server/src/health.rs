//! `/health` and `/devices` response bodies.

use std::collections::BTreeSet;
use std::time::Instant;

use faralite_core::DeviceId;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"shutting_down"` once stop was requested.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open device connections.
    pub connections: usize,
    /// Distinct online devices.
    pub online_devices: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    shutting_down: bool,
    connections: usize,
    online_devices: usize,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        online_devices,
    }
}

/// `/devices` response body.
#[derive(Debug, Clone, Serialize)]
pub struct DevicesResponse {
    /// Online device identifiers, sorted.
    pub devices: Vec<DeviceId>,
    /// Number of entries in `devices`.
    pub count: usize,
}

impl From<BTreeSet<DeviceId>> for DevicesResponse {
    fn from(set: BTreeSet<DeviceId>) -> Self {
        let devices: Vec<DeviceId> = set.into_iter().collect();
        Self {
            count: devices.len(),
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), false, 0, 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn status_reports_shutdown() {
        assert_eq!(health_check(Instant::now(), true, 0, 0).status, "shutting_down");
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now().checked_sub(std::time::Duration::from_secs(60)).unwrap();
        assert!(health_check(start, false, 0, 0).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let json = serde_json::to_value(health_check(Instant::now(), false, 3, 2)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 3);
        assert_eq!(json["online_devices"], 2);
    }

    #[test]
    fn devices_response_is_sorted() {
        let set: BTreeSet<DeviceId> = ["Z9", "A1"]
            .iter()
            .filter_map(|s| DeviceId::parse(s))
            .collect();
        let json = serde_json::to_value(DevicesResponse::from(set)).unwrap();
        assert_eq!(json["devices"], serde_json::json!(["A1", "Z9"]));
        assert_eq!(json["count"], 2);
    }
}
