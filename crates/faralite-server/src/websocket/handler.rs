//! Per-connection read/write loop for a device socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::DeviceConnection;
use crate::session::FrameOutcome;

/// How long cleanup waits for the write task to flush its close frame.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Ping cadence and liveness cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Interval between server-initiated Ping frames.
    pub interval: Duration,
    /// Disconnect when nothing has been heard for this long.
    pub timeout: Duration,
}

impl Heartbeat {
    /// Build from whole seconds. Zero interval is bumped to one second.
    pub fn from_secs(interval: u64, timeout: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval.max(1)),
            timeout: Duration::from_secs(timeout),
        }
    }
}

/// Drive one device socket until it closes, the device goes quiet, or
/// `cancel` fires.
///
/// 1. Spawns a writer that drains the outbound queue and sends Ping frames
/// 2. Feeds Text and Binary frames to the session in arrival order
/// 3. Closes the session (unregistering the device) and the outbound queue
#[instrument(skip_all, fields(conn_id = %conn.id))]
pub async fn run_device_connection(
    socket: WebSocket,
    conn: Arc<DeviceConnection>,
    cancel: CancellationToken,
    heartbeat: Heartbeat,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    conn.outbound.open();

    let stop = cancel.child_token();

    let writer_conn = Arc::clone(&conn);
    let writer_stop = stop.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat.interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                () = writer_stop.cancelled() => break,
                msg = writer_conn.outbound.next() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !writer_conn.check_alive()
                        && writer_conn.last_pong_elapsed() > heartbeat.timeout
                    {
                        warn!(timeout = ?heartbeat.timeout, "device unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = ws_tx.send(Message::Close(None)).await;
        // Unblocks the reader when the writer is the side that gave up.
        writer_stop.cancel();
    });

    loop {
        let msg = tokio::select! {
            () = stop.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break;
            }
            None => break,
        };
        conn.mark_alive();

        let outcome = match msg {
            Message::Text(text) => conn.session.on_frame(text.as_str()),
            Message::Binary(data) => conn.session.on_binary_frame(&data),
            Message::Close(_) => {
                debug!("device sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match outcome {
            FrameOutcome::Forwarded { identified: true } => {
                if let Some(device) = conn.device() {
                    info!(device = %device, "connection identified");
                }
            }
            FrameOutcome::Forwarded { identified: false } | FrameOutcome::Skipped(_) => {}
            FrameOutcome::Closed => break,
        }
    }

    let _ = conn.session.close();
    let _ = conn.outbound.close();
    stop.cancel();

    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, writer).await.is_err() {
        debug!("writer did not finish in time, aborting");
        abort.abort();
    }
}
