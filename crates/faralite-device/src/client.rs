//! Reconnecting `WebSocket` client for a simulated device.
//!
//! Outbound frames go through a [`DispatchQueue`] that is open only while a
//! socket is up, so [`DeviceClient::send`] reports `NotConnected` instead of
//! buffering across outages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use faralite_core::{AccessEvent, DispatchQueue, OverflowPolicy, SendStatus, encode};
use faralite_settings::{DeviceSettings, ReconnectSettings};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::DeviceError;

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Connection state published on [`DeviceClient::subscribe_status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientStatus {
    /// Dialing the broker. `attempt` counts from 1 after each success.
    Connecting {
        /// Consecutive attempt number.
        attempt: u32,
    },
    /// Socket is up; sends are accepted.
    Connected,
    /// An established socket went away.
    Disconnected {
        /// Why the socket ended.
        reason: String,
    },
    /// A connection attempt failed.
    Error(String),
    /// Reconnection limit reached; the client is finished.
    GaveUp {
        /// Consecutive failures at the time of giving up.
        attempts: u32,
    },
}

/// Exponential backoff between connection attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Give up after this many consecutive failures. `0` retries forever.
    pub max_attempts: u32,
    /// Delay after a drop or the first failure.
    pub initial_backoff: Duration,
    /// Delay ceiling.
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectSettings::default())
    }
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(s: &ReconnectSettings) -> Self {
        Self {
            max_attempts: s.max_attempts,
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms.max(s.initial_backoff_ms)),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt after `failures` consecutive failed
    /// attempts, or `None` once the limit is reached.
    ///
    /// `initial * 2^(failures - 1)`, capped at `max_backoff`. Zero failures
    /// (a dropped connection) waits `initial_backoff`.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if self.max_attempts > 0 && failures >= self.max_attempts {
            return None;
        }
        let exponent = failures.saturating_sub(1).min(31);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        Some(delay.min(self.max_backoff))
    }
}

/// Client configuration.
#[derive(Clone, Debug)]
pub struct DeviceClientConfig {
    /// Broker URL, e.g. `ws://127.0.0.1:8765`.
    pub server_url: String,
    /// Sent as `Authorization: Bearer` when set.
    pub auth_token: Option<String>,
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// What a full queue does with new frames.
    pub overflow_policy: OverflowPolicy,
    /// Reconnection behavior.
    pub reconnect: ReconnectPolicy,
}

impl From<&DeviceSettings> for DeviceClientConfig {
    fn from(s: &DeviceSettings) -> Self {
        Self {
            server_url: s.server_url.clone(),
            auth_token: s.auth_token.clone().filter(|t| !t.is_empty()),
            queue_capacity: s.queue_capacity,
            overflow_policy: OverflowPolicy::default(),
            reconnect: ReconnectPolicy::from(&s.reconnect),
        }
    }
}

/// Handle to a running device client task.
pub struct DeviceClient {
    queue: Arc<DispatchQueue<String>>,
    status: broadcast::Sender<ClientStatus>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceClient {
    /// Start connecting in the background. Must be called inside a Tokio
    /// runtime.
    pub fn spawn(config: DeviceClientConfig) -> Self {
        let queue = Arc::new(DispatchQueue::new(config.queue_capacity, config.overflow_policy));
        let (status, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let runner = Runner {
            config,
            queue: Arc::clone(&queue),
            status: status.clone(),
            connected: Arc::clone(&connected),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(runner.run());

        Self {
            queue,
            status,
            connected,
            cancel,
            task,
        }
    }

    /// Queue a raw text frame.
    pub fn send(&self, text: String) -> SendStatus {
        self.queue.send(text)
    }

    /// Encode and queue an access event.
    pub fn send_event(&self, event: &AccessEvent) -> SendStatus {
        self.send(encode(event))
    }

    /// Receiver for status changes published after this call.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    /// Frames queued but not yet written.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether a socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether the background task has ended (stopped or gave up).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the client to close its socket and stop reconnecting.
    pub fn stop(&self) {
        self.cancel.cancel();
        let _ = self.queue.close();
    }

    /// Stop and wait for the background task.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "device client task failed");
        }
    }
}

struct Runner {
    config: DeviceClientConfig,
    queue: Arc<DispatchQueue<String>>,
    status: broadcast::Sender<ClientStatus>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Runner {
    fn publish(&self, status: ClientStatus) {
        let _ = self.status.send(status);
    }

    #[instrument(skip_all, fields(url = %self.config.server_url))]
    async fn run(self) {
        let mut failures: u32 = 0;
        loop {
            let request = match build_request(&self.config) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "cannot build connection request");
                    self.publish(ClientStatus::Error(e.to_string()));
                    self.publish(ClientStatus::GaveUp { attempts: failures });
                    break;
                }
            };

            self.publish(ClientStatus::Connecting { attempt: failures + 1 });
            let connected = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = connect_async(request) => result,
            };

            match connected {
                Ok((ws, _)) => {
                    failures = 0;
                    self.queue.open();
                    self.connected.store(true, Ordering::Release);
                    info!("connected to broker");
                    self.publish(ClientStatus::Connected);

                    let reason = self.pump(ws).await;

                    self.connected.store(false, Ordering::Release);
                    self.queue.suspend();
                    info!(reason = %reason, "disconnected from broker");
                    self.publish(ClientStatus::Disconnected { reason });
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, failures, "connection attempt failed");
                    self.publish(ClientStatus::Error(e.to_string()));
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            let Some(delay) = self.config.reconnect.delay_for(failures) else {
                warn!(failures, "giving up on broker");
                self.publish(ClientStatus::GaveUp { attempts: failures });
                break;
            };
            debug!(delay = ?delay, "reconnecting after backoff");
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        let _ = self.queue.close();
        self.connected.store(false, Ordering::Release);
    }

    /// Move queued frames to the socket and log what the broker sends back.
    /// Returns why the socket ended.
    async fn pump(&self, ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> String {
        let (mut tx, mut rx) = ws.split();
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = tx.send(Message::Close(None)).await;
                    return "stopped".into();
                }
                next = self.queue.next() => {
                    let Some(text) = next else {
                        let _ = tx.send(Message::Close(None)).await;
                        return "queue closed".into();
                    };
                    if let Err(e) = tx.send(Message::Text(text.into())).await {
                        return e.to_string();
                    }
                    debug!("frame sent");
                }
                frame = rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => info!(frame = %text.as_str(), "broker frame"),
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "broker binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => return "closed by broker".into(),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return e.to_string(),
                },
            }
        }
    }
}

fn build_request(config: &DeviceClientConfig) -> Result<Request, DeviceError> {
    let mut request = config.server_url.as_str().into_client_request()?;
    if let Some(token) = config.auth_token.as_deref() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| DeviceError::InvalidRequest(e.to_string()))?;
        let _ = request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}
