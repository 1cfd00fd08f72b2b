//! Logging setup for migration runs.
//!
//! The runner reports through `tracing`; this module only installs a
//! subscriber for binaries that do not bring their own.
//!
//! # Environment Variables
//!
//! - `STRATA_DEBUG=true` - Enable debug logging
//! - `STRATA_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `STRATA_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! Without the `tracing-subscriber` feature [`init`] does nothing.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `STRATA_DEBUG`.
pub fn is_debug_enabled() -> bool {
    env::var("STRATA_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Resolve a log level name, falling back to the `STRATA_DEBUG` default.
fn normalize_level(level: Option<&str>) -> &'static str {
    match level.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ if is_debug_enabled() => "debug",
        _ => "warn",
    }
}

/// Get the configured log level from `STRATA_LOG_LEVEL`.
///
/// Defaults to "debug" if `STRATA_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    normalize_level(env::var("STRATA_LOG_LEVEL").ok().as_deref())
}

/// Get the configured log format from `STRATA_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("STRATA_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize logging from the environment.
///
/// Does nothing unless `STRATA_DEBUG` or `STRATA_LOG_LEVEL` is set.
/// Subsequent calls are no-ops.
pub fn init() {
    if !is_debug_enabled() && env::var("STRATA_LOG_LEVEL").is_err() {
        return;
    }
    install(get_log_level());
}

/// Initialize logging with an explicit level, e.g. from
/// [`DebugConfig::log_level`](crate::config::DebugConfig::log_level).
pub fn init_with_level(level: &str) {
    install(normalize_level(Some(level)));
}

fn install(level: &'static str) {
    INIT.call_once(|| {
        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(format!(
                "strata={level},strata_migrate={level},strata_sqlite={level}"
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match get_log_format() {
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                "pretty" => registry.with(fmt::layer().pretty()).try_init(),
                _ => registry.with(fmt::layer().json()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level, format = get_log_format(), "Strata logging initialized");
            }
        }

        #[cfg(not(feature = "tracing-subscriber"))]
        let _ = level;
    });
}
