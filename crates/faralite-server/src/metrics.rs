//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Device connections accepted (counter).
pub const DEVICE_CONNECTIONS_TOTAL: &str = "device_connections_total";
/// Open device connections (gauge).
pub const DEVICE_CONNECTIONS_ACTIVE: &str = "device_connections_active";
/// Frames decoded and forwarded (counter).
pub const DEVICE_FRAMES_TOTAL: &str = "device_frames_total";
/// Frames rejected by the codec (counter, labels: reason).
pub const DEVICE_DECODE_FAILURES_TOTAL: &str = "device_decode_failures_total";
/// Registry online/offline transitions (counter).
pub const PRESENCE_TRANSITIONS_TOTAL: &str = "presence_transitions_total";
/// Outbound messages evicted or rejected by a full queue (counter).
pub const OUTBOUND_DROPS_TOTAL: &str = "outbound_drops_total";
