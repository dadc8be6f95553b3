//! `IngestionServer`: Axum HTTP + `WebSocket` server for devices.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use dashmap::DashMap;
use faralite_core::{BrokerEvent, ConnectionId, DeviceId, DispatchQueue, SendStatus};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, DevicesResponse, HealthResponse};
use crate::metrics::{DEVICE_CONNECTIONS_ACTIVE, DEVICE_CONNECTIONS_TOTAL};
use crate::registry::DeviceRegistry;
use crate::session::DeviceSession;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::DeviceConnection;
use crate::websocket::handler::{Heartbeat, run_device_connection};

type Connections = Arc<DashMap<ConnectionId, Arc<DeviceConnection>>>;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Online device set.
    pub registry: Arc<DeviceRegistry>,
    /// Event stream shared by every session.
    pub events: broadcast::Sender<BrokerEvent>,
    /// Open device connections.
    pub connections: Connections,
    /// One permit per allowed connection, taken before the upgrade.
    pub slots: Arc<Semaphore>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// Device ingestion server.
///
/// Accepts device sockets, tracks which devices are online and fans every
/// decoded event and presence change out to [`IngestionServer::subscribe`]
/// receivers.
pub struct IngestionServer {
    config: Arc<ServerConfig>,
    registry: Arc<DeviceRegistry>,
    events: broadcast::Sender<BrokerEvent>,
    connections: Connections,
    slots: Arc<Semaphore>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl IngestionServer {
    /// Create a new server. Nothing is bound until [`Self::listen`].
    pub fn new(config: ServerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            registry: Arc::new(DeviceRegistry::new(events.clone())),
            events,
            slots: Arc::new(Semaphore::new(config.max_connections.min(Semaphore::MAX_PERMITS))),
            config: Arc::new(config),
            connections: Arc::new(DashMap::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn state(&self) -> AppState {
        AppState {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            connections: Arc::clone(&self.connections),
            slots: Arc::clone(&self.slots),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/devices", get(devices_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state())
    }

    /// New receiver for access events and presence changes. Only events
    /// published after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events.subscribe()
    }

    /// The presence registry.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Snapshot of online devices.
    pub fn online_devices(&self) -> BTreeSet<DeviceId> {
        self.registry.snapshot()
    }

    /// Open device connections, identified or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Queue a text frame for every connection bound to `device`.
    ///
    /// Returns the first accepted status, or the last failure. With no bound
    /// connection the result is [`SendStatus::NotConnected`].
    pub fn send_to_device(&self, device: &DeviceId, text: &str) -> SendStatus {
        let targets: Vec<Arc<DeviceConnection>> = self
            .connections
            .iter()
            .filter(|entry| entry.value().device().as_ref() == Some(device))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut result = SendStatus::NotConnected;
        for conn in targets {
            let status = conn.send(text.to_owned());
            if !result.is_sent() {
                result = status;
            }
        }
        debug!(device = %device, status = ?result, "send to device");
        result
    }

    /// Bind and start serving. Returns the bound address and the accept
    /// loop's task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        let local = listener.local_addr()?;
        info!(addr = %local, "ingestion server listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = self.shutdown.spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server loop failed");
            }
        });
        Ok((local, handle))
    }

    /// Stop accepting and close every session. Idempotent.
    pub fn stop(&self) {
        if !self.shutdown.is_shutting_down() {
            info!(connections = self.connections.len(), "stopping ingestion server");
        }
        self.shutdown.shutdown();
    }

    /// Stop, then wait up to `timeout` for every task to finish. Returns
    /// `true` if everything finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.stop();
        self.shutdown.graceful_shutdown(Some(timeout)).await
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// GET / and /ws
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    if !auth::authorize(state.config.auth_token.as_deref(), &headers, query.token.as_deref()) {
        warn!("rejected device connection: bad or missing token");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };
    // The permit travels with the connection and is released when it ends,
    // or when the upgrade fails and the callback is dropped.
    let Ok(slot) = Arc::clone(&state.slots).try_acquire_owned() else {
        warn!(max = state.config.max_connections, "rejected device connection: at capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let tracker = state.shutdown.tracker().clone();
    upgrade
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| tracker.track_future(serve_connection(socket, state, slot)))
}

async fn serve_connection(socket: WebSocket, state: AppState, slot: OwnedSemaphorePermit) {
    let conn_id = ConnectionId::new();
    let session = DeviceSession::new(
        conn_id.clone(),
        Arc::clone(&state.registry),
        state.events.clone(),
    );
    let outbound = DispatchQueue::new(
        state.config.outbound_queue_capacity,
        state.config.overflow_policy,
    );
    let conn = Arc::new(DeviceConnection::new(session, outbound));

    let _ = state.connections.insert(conn_id.clone(), Arc::clone(&conn));
    counter!(DEVICE_CONNECTIONS_TOTAL).increment(1);
    gauge!(DEVICE_CONNECTIONS_ACTIVE).increment(1.0);
    info!(conn_id = %conn_id, "device connected");

    let heartbeat = Heartbeat::from_secs(
        state.config.heartbeat_interval_secs,
        state.config.heartbeat_timeout_secs,
    );
    run_device_connection(socket, Arc::clone(&conn), state.shutdown.token(), heartbeat).await;

    let _ = state.connections.remove(&conn_id);
    drop(slot);
    gauge!(DEVICE_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(
        conn_id = %conn_id,
        device = ?conn.device(),
        age_secs = conn.age().as_secs(),
        "device disconnected"
    );
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.shutdown.is_shutting_down(),
        state.connections.len(),
        state.registry.len(),
    ))
}

/// GET /devices
async fn devices_handler(State(state): State<AppState>) -> Json<DevicesResponse> {
    Json(DevicesResponse::from(state.registry.snapshot()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.as_ref() {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
