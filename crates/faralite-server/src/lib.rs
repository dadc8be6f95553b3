//! # faralite-server
//!
//! Device ingestion server for the Faralite event hub.
//!
//! - `WebSocket` gateway on `/` and `/ws`: one [`session::DeviceSession`] per connection
//! - [`registry::DeviceRegistry`]: reference-counted set of online devices
//! - Fan-out of decoded events and presence changes on one `tokio::sync::broadcast` stream
//! - HTTP endpoints: `/health`, `/devices`, `/metrics`
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use registry::DeviceRegistry;
pub use server::IngestionServer;
pub use session::{DeviceSession, FrameOutcome, SessionState};
