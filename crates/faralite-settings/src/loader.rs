//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FaraliteSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `FARALITE_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use faralite_core::OverflowPolicy;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::FaraliteSettings;

/// Data directory (`~/.faralite`).
pub fn faralite_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".faralite")
}

/// Resolve the path to the settings file (`~/.faralite/settings.json`).
pub fn settings_path() -> PathBuf {
    faralite_home().join("settings.json")
}

/// Resolve a configured path: absolute paths are kept, relative ones are
/// joined onto `base`.
pub fn resolve_path(base: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FaraliteSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from an explicitly requested file, which must exist.
/// `None` falls back to [`load_settings`].
pub fn load_settings_from(explicit: Option<&Path>) -> Result<FaraliteSettings> {
    match explicit {
        Some(path) if !path.exists() => Err(SettingsError::NotFound(path.display().to_string())),
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<FaraliteSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<FaraliteSettings> {
    let defaults = serde_json::to_value(FaraliteSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut FaraliteSettings) {
    apply_env_overrides_from(settings, &|name: &str| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides_from(
    settings: &mut FaraliteSettings,
    lookup: &dyn Fn(&str) -> Option<String>,
) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("FARALITE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("FARALITE_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("FARALITE_MAX_CONNECTIONS", 1, 100_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.usize("FARALITE_MAX_MESSAGE_SIZE", 1024, 16 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.usize("FARALITE_EVENT_CHANNEL_CAPACITY", 16, 1_000_000) {
        settings.server.event_channel_capacity = v;
    }
    if let Some(v) = env.usize("FARALITE_OUTBOUND_QUEUE_CAPACITY", 1, 100_000) {
        settings.server.outbound_queue_capacity = v;
    }
    if let Some(v) = env.string("FARALITE_OVERFLOW_POLICY") {
        match v.parse::<OverflowPolicy>() {
            Ok(policy) => settings.server.overflow_policy = policy,
            Err(e) => warn!(
                key = "FARALITE_OVERFLOW_POLICY",
                value = %v,
                error = %e,
                "invalid env var, ignoring"
            ),
        }
    }
    if let Some(v) = env.u64("FARALITE_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64("FARALITE_HEARTBEAT_TIMEOUT_SECS", 1, 86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.string("FARALITE_AUTH_TOKEN") {
        settings.server.auth_token = Some(v.clone());
        settings.device.auth_token = Some(v);
    }
    if let Some(v) = env.bool("FARALITE_METRICS_ENABLED") {
        settings.server.metrics_enabled = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("FARALITE_DB_PATH") {
        settings.storage.db_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("FARALITE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("FARALITE_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Device client ───────────────────────────────────────────────
    if let Some(v) = env.string("FARALITE_SERVER_URL") {
        settings.device.server_url = v;
    }
    if let Some(v) = env.string("FARALITE_DEVICE_SERIAL") {
        settings.device.device_serial = v;
    }
    if let Some(v) = env.string("FARALITE_SITE_CODE") {
        settings.device.site_code = v;
    }
    if let Some(v) = env.u64("FARALITE_EVENT_INTERVAL_MS", 10, 3_600_000) {
        settings.device.event_interval_ms = v;
    }
    if let Some(v) = env.u32("FARALITE_RECONNECT_MAX_ATTEMPTS", 0, 1_000_000) {
        settings.device.reconnect.max_attempts = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.parsed(name, "u32", |v| parse_u32_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
