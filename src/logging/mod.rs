// Logging module for structured logging using the tracing crate

use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for structured logging
///
/// The subscriber is configured with:
/// - JSON formatting for easy parsing by log aggregation systems
/// - Filtering from `RUST_LOG`, falling back to `default_level`
/// - Output to stdout for container/cloud-native deployments
///
/// Calling this more than once is harmless: the first installed subscriber
/// stays in place and later calls return `Ok(())`.
///
/// # Errors
///
/// Returns an error if `default_level` is not a valid filter directive.
///
/// # Examples
///
/// ```
/// use gatewatch::logging::init_subscriber;
///
/// init_subscriber("info").expect("Failed to initialize logging");
/// tracing::info!("Application started");
/// ```
pub fn init_subscriber(default_level: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };

    // try_init fails only when a global subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(false)
        .try_init();

    Ok(())
}
