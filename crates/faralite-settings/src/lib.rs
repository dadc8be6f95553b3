//! # faralite-settings
//!
//! Layered configuration for the Faralite event hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`FaraliteSettings::default()`]
//! 2. **Settings file**: `~/.faralite/settings.json` or an explicit path
//! 3. **Environment variables**: `FARALITE_*` overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_from, deep_merge, faralite_home, load_settings,
    load_settings_from, load_settings_from_path, resolve_path, settings_path,
};
pub use types::*;
