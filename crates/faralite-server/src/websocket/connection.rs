//! Device connection state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use faralite_core::{ConnectionId, DeviceId, DispatchQueue, SendStatus};
use metrics::counter;
use parking_lot::Mutex;

use crate::metrics::OUTBOUND_DROPS_TOTAL;
use crate::session::DeviceSession;

/// A connected device socket.
pub struct DeviceConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Identity and event forwarding for this socket.
    pub session: DeviceSession,
    /// Frames waiting for the write task.
    pub outbound: DispatchQueue<String>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the device has shown activity since the last ping.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
}

impl DeviceConnection {
    /// Create a new connection.
    pub fn new(session: DeviceSession, outbound: DispatchQueue<String>) -> Self {
        let now = Instant::now();
        Self {
            id: session.conn_id().clone(),
            session,
            outbound,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
        }
    }

    /// Queue a text frame for the device.
    pub fn send(&self, text: String) -> SendStatus {
        let status = self.outbound.send(text);
        if matches!(status, SendStatus::QueuedDroppedOldest | SendStatus::Full) {
            counter!(OUTBOUND_DROPS_TOTAL).increment(1);
        }
        status
    }

    /// Device bound to this connection, if identified.
    pub fn device(&self) -> Option<DeviceId> {
        self.session.device()
    }

    /// Record activity from the device.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag. Returns `true` if the device was
    /// active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last activity (or since connect).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
