//! Per-connection device session.
//!
//! `AwaitingIdentity -> Streaming -> Closed`. The first decoded event with a
//! non-blank `device_serial` binds the session and registers the device;
//! later identities are ignored. Every decoded event is forwarded in either
//! open state. Closing unregisters the bound device exactly once.

use std::sync::Arc;

use faralite_core::{AccessEvent, BrokerEvent, ConnectionId, DecodeError, DeviceId, codec};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::metrics::{DEVICE_DECODE_FAILURES_TOTAL, DEVICE_FRAMES_TOTAL};
use crate::registry::DeviceRegistry;

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no identity yet.
    AwaitingIdentity,
    /// Identity bound and registered.
    Streaming,
    /// Torn down.
    Closed,
}

/// What happened to one inbound frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Decoded and published. `identified` is set on the frame that bound
    /// the session.
    Forwarded {
        /// This frame bound the session's identity.
        identified: bool,
    },
    /// Rejected by the codec; the session keeps reading.
    Skipped(DecodeError),
    /// The session is already closed.
    Closed,
}

struct SessionInner {
    state: SessionState,
    device: Option<DeviceId>,
}

/// Server-side state for one device connection.
pub struct DeviceSession {
    conn_id: ConnectionId,
    inner: Mutex<SessionInner>,
    registry: Arc<DeviceRegistry>,
    events: broadcast::Sender<BrokerEvent>,
}

impl DeviceSession {
    /// New session in [`SessionState::AwaitingIdentity`].
    pub fn new(
        conn_id: ConnectionId,
        registry: Arc<DeviceRegistry>,
        events: broadcast::Sender<BrokerEvent>,
    ) -> Self {
        Self {
            conn_id,
            inner: Mutex::new(SessionInner {
                state: SessionState::AwaitingIdentity,
                device: None,
            }),
            registry,
            events,
        }
    }

    /// Connection this session belongs to.
    pub fn conn_id(&self) -> &ConnectionId {
        &self.conn_id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Bound device, if any.
    pub fn device(&self) -> Option<DeviceId> {
        self.inner.lock().device.clone()
    }

    /// Handle one text frame.
    pub fn on_frame(&self, frame: &str) -> FrameOutcome {
        self.on_decoded(codec::decode(frame))
    }

    /// Handle one binary frame (UTF-8 JSON).
    pub fn on_binary_frame(&self, frame: &[u8]) -> FrameOutcome {
        self.on_decoded(codec::decode_bytes(frame))
    }

    fn on_decoded(&self, decoded: Result<AccessEvent, DecodeError>) -> FrameOutcome {
        let event = match decoded {
            Ok(event) => event,
            Err(e) => {
                debug!(conn_id = %self.conn_id, reason = e.kind(), error = %e, "frame skipped");
                counter!(DEVICE_DECODE_FAILURES_TOTAL, "reason" => e.kind()).increment(1);
                return FrameOutcome::Skipped(e);
            }
        };

        // Held across register + publish so this session's presence change
        // always precedes its first event on the stream.
        let mut inner = self.inner.lock();
        let identified = match inner.state {
            SessionState::Closed => return FrameOutcome::Closed,
            SessionState::AwaitingIdentity => match event.device_id() {
                Some(id) => {
                    let came_online = self.registry.register_if_absent(&id);
                    info!(conn_id = %self.conn_id, device = %id, came_online, "device identified");
                    inner.device = Some(id);
                    inner.state = SessionState::Streaming;
                    true
                }
                None => false,
            },
            SessionState::Streaming => {
                if let (Some(bound), Some(claimed)) = (inner.device.as_ref(), event.device_id()) {
                    if *bound != claimed {
                        debug!(
                            conn_id = %self.conn_id,
                            device = %bound,
                            claimed = %claimed,
                            "ignoring later identity"
                        );
                    }
                }
                false
            }
        };

        debug!(
            conn_id = %self.conn_id,
            command = %event.command,
            card = %event.card_number,
            "event forwarded"
        );
        counter!(DEVICE_FRAMES_TOTAL).increment(1);
        let _ = self.events.send(BrokerEvent::Access(event));
        FrameOutcome::Forwarded { identified }
    }

    /// Tear down. Returns `true` only for the call that performed the
    /// transition.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Closed {
            return false;
        }
        inner.state = SessionState::Closed;
        if let Some(id) = inner.device.as_ref() {
            let went_offline = self.registry.unregister(id);
            info!(conn_id = %self.conn_id, device = %id, went_offline, "device session closed");
        } else {
            debug!(conn_id = %self.conn_id, "unidentified session closed");
        }
        true
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
