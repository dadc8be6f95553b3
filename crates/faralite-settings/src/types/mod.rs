//! Settings type definitions.
//!
//! All types use camelCase keys and `#[serde(default)]`, so a settings file
//! only needs the fields it changes.

mod device;
mod server;

pub use device::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "authToken": "s3cret" },
///   "storage": { "dbPath": "/var/lib/faralite/hub.db" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaraliteSettings {
    /// Ingestion server.
    pub server: ServerSettings,
    /// Database location.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Reference device client.
    pub device: DeviceSettings,
}
