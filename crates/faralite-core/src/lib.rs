//! # faralite-core
//!
//! Shared types for the Faralite access-control event hub.
//!
//! - [`ids`]: device and connection identifiers
//! - [`events`]: decoded access events and the broker's outbound stream items
//! - [`codec`]: wire frame decoding/encoding
//! - [`dispatch`]: bounded, non-blocking outbound dispatch queue

#![deny(unsafe_code)]

pub mod codec;
pub mod dispatch;
pub mod events;
pub mod ids;

pub use codec::{DecodeError, decode, decode_bytes, encode};
pub use dispatch::{DispatchQueue, OverflowPolicy, SendStatus};
pub use events::{AccessEvent, BrokerEvent, Command, Direction};
pub use ids::{BlankDeviceId, ConnectionId, DeviceId};
