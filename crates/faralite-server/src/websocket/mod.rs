//! `WebSocket` connection state and the per-connection read/write loop.

pub mod connection;
pub mod handler;
