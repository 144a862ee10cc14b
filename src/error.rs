// Error types module

use crate::proxy::ProxyError;

/// Centralized error type for the metrics engine
///
/// None of these ever reach the caller of an instrumented handler or
/// dispatcher: instrumentation failures are logged where they happen.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Configuration errors (unreadable file, invalid YAML, bad address)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The export endpoint could not bind its listening socket
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The export endpoint failed while serving a connection
    #[error("Serve error: {0}")]
    Serve(String),

    /// Snapshot serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (reading configuration or process statistics)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error surfaced by a dispatch pipeline
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

impl From<hyper::Error> for MetricsError {
    fn from(err: hyper::Error) -> Self {
        MetricsError::Serve(err.to_string())
    }
}
