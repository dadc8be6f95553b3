//! # faralite-logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` (`RUST_LOG`
//! wins over the configured level) feeding either a JSON or a
//! human-readable fmt layer.

#![deny(unsafe_code)]

use faralite_settings::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Fallback directive when the configured level does not parse.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Errors from subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber is already set.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Build the filter. `RUST_LOG` takes precedence; otherwise `level` is used
/// as a directive string (e.g. `info,faralite_server=debug`).
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| directive_filter(level))
}

fn directive_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("faralite-logging: invalid log level {level:?} ({e}), using {DEFAULT_DIRECTIVE}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

/// Install the global subscriber. Call once at startup.
pub fn init_subscriber(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(&settings.level);

    let fmt_layer = if settings.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()?;
    Ok(())
}
