//! Tracing initialization for the speech connector.
//!
//! Sets up the tracing subscriber with environment-based filtering via the
//! `RUST_LOG` environment variable. Output goes to stderr so that anything a
//! binary prints on stdout (reply JSON, descriptors) stays machine-readable.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls the log level and filtering. Examples:
//!   - `RUST_LOG=debug` - Enable debug logging for all modules
//!   - `RUST_LOG=bsp_connector=debug` - Enable debug for the adapter only
//!   - `RUST_LOG=warn,bsp_connector_common=debug` - Warn by default, debug for common

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the tracing subscriber, defaulting to `info`.
///
/// # Panics
///
/// This function will panic if called more than once, as the global
/// subscriber can only be set once.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a custom default level used when `RUST_LOG` is unset.
///
/// # Example
///
/// ```no_run
/// use bsp_connector_common::tracing::init_tracing_with_default;
///
/// fn main() {
///     init_tracing_with_default("debug");
///     tracing::debug!("verbose output enabled");
/// }
/// ```
pub fn init_tracing_with_default(default_level: &str) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(build_filter(default_level))
        .with(fmt_layer)
        .init();
}

/// Try to initialize tracing, returning an error if already initialized.
///
/// Unlike `init_tracing()`, this does not panic when a subscriber is already
/// set, which makes it safe to call from tests.
pub fn try_init_tracing() -> Result<(), ()> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(build_filter("info"))
        .with(fmt_layer)
        .try_init()
        .map_err(|_| ())
}
