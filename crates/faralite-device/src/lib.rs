//! # faralite-device
//!
//! Reference device for the Faralite event hub.
//!
//! - [`client::DeviceClient`]: reconnecting `WebSocket` sender with status updates
//! - [`factory::EventFactory`]: random and manual access events

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod factory;

pub use client::{ClientStatus, DeviceClient, DeviceClientConfig, ReconnectPolicy};
pub use errors::DeviceError;
pub use factory::EventFactory;
