//! # faralite-store
//!
//! `SQLite` persistence for registered users (card holders) and the access
//! log written by the dashboard consumer.

#![deny(unsafe_code)]

pub mod database;
pub mod error;
pub mod logs;
pub mod schema;
pub mod users;

pub use database::Database;
pub use error::StoreError;
pub use logs::{LogRecord, LogRepo, NewLogRecord};
pub use users::{NewUser, PERMISSIONS, UserRepo, UserRow};
