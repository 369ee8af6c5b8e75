//! Logging setup.
//!
//! The crate itself only emits `tracing` events: `info!` for lifecycle changes
//! (client created, connected, destroyed) and `debug!` for every forwarded
//! operation. Applications that do not install their own subscriber can call
//! [`init`] once at startup (requires the `tracing-subscriber` feature).
//!
//! # Environment Variables
//!
//! - `GOMONGO_DEBUG=true` - Enable debug logging
//! - `GOMONGO_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `GOMONGO_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const TARGETS: [&str; 2] = ["gomongo", "gomongo_client"];

/// Check if debug logging is enabled via `GOMONGO_DEBUG`.
///
/// Returns `true` if it is set to "true", "1", or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("GOMONGO_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn parse_level(level: &str) -> Option<&'static str> {
    match level.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

/// The log level from `GOMONGO_LOG_LEVEL`.
///
/// Falls back to "debug" when `GOMONGO_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    env::var("GOMONGO_LOG_LEVEL")
        .ok()
        .and_then(|level| parse_level(&level))
        .unwrap_or(if is_debug_enabled() { "debug" } else { "warn" })
}

/// The log format from `GOMONGO_LOG_FORMAT`. Defaults to "json".
pub fn get_log_format() -> &'static str {
    env::var("GOMONGO_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

#[cfg_attr(not(feature = "tracing-subscriber"), allow(dead_code))]
fn directives(level: &str) -> String {
    TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize logging from the environment.
///
/// Does nothing unless `GOMONGO_DEBUG` or `GOMONGO_LOG_LEVEL` is set. Only the
/// first call to [`init`] or [`init_with_level`] has any effect.
pub fn init() {
    if !is_debug_enabled() && env::var("GOMONGO_LOG_LEVEL").is_err() {
        return;
    }
    install(get_log_level(), get_log_format());
}

/// Initialize logging at `level`, ignoring `GOMONGO_LOG_LEVEL` and `GOMONGO_DEBUG`.
pub fn init_with_level(level: &str) {
    install(parse_level(level).unwrap_or("warn"), get_log_format());
}

#[cfg_attr(not(feature = "tracing-subscriber"), allow(unused_variables))]
fn install(level: &'static str, format: &'static str) {
    INIT.call_once(|| {
        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter =
                EnvFilter::try_new(directives(level)).unwrap_or_else(|_| EnvFilter::new("warn"));

            // try_init: another subscriber may already be installed by the application.
            let installed = match format {
                "pretty" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level = level, format = format, "GoMongo logging initialized");
            }
        }
    });
}
