// bot/src/logging.rs

use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Noisy transport crates are capped unless the caller passes full directives.
const QUIET_DEPENDENCIES: &str = "hyper=info,reqwest=info,rustls=info,h2=info";

/// Builds the filter from `RUST_LOG` when set, else from `log_level`.
pub fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = log_level.trim();
    let spec = if level.contains(',') || level.contains('=') {
        level.to_string()
    } else {
        format!("{},{}", level, QUIET_DEPENDENCIES)
    };
    EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Safe to call twice; the second call is a no-op.
pub fn setup_logging(log_level: &str, json_format: bool) {
    let subscriber = tracing_subscriber::registry().with(build_filter(log_level));
    let installed = if json_format {
        subscriber
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(true).compact())
            .try_init()
    };
    if installed.is_ok() {
        tracing::debug!(format = if json_format { "json" } else { "compact" }, "Logging initialized.");
    }
}

/// Test subscriber writing through the libtest capture.
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}
