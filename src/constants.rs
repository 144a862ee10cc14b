// Constants module - centralized default values for the metrics engine
//
// Every tunable default used by the collectors, the aggregator and the export
// endpoint lives here so configuration code and tests agree on one value.

use std::time::Duration;

// =============================================================================
// Namespaces
// =============================================================================

/// Prefix of the root registry shared by every collector
pub const ROOT_PREFIX: &str = "gatewatch.";

/// Prefix of the router collector namespace
pub const ROUTER_PREFIX: &str = "router.";

/// Prefix of the proxy collector namespace
pub const PROXY_PREFIX: &str = "proxy.";

/// Prefix of the process runtime namespace
pub const SERVICE_PREFIX: &str = "service.";

// =============================================================================
// Collection defaults
// =============================================================================

/// Default aggregation/snapshot period
pub const DEFAULT_COLLECTION_TIME: Duration = Duration::from_secs(60);

/// Default address of the export endpoint (all interfaces)
pub const DEFAULT_LISTEN_ADDRESS: &str = ":8090";

/// Path served by the export endpoint
pub const STATS_PATH: &str = "/__stats";

/// Grace period granted to open export connections on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// Histogram defaults
// =============================================================================

/// Capacity of the uniform reservoir backing every histogram
pub const DEFAULT_SAMPLE_SIZE: usize = 1028;

/// Quantiles reported for every histogram
pub const PERCENTILES: [f64; 7] = [0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99];

// =============================================================================
// Proxy recorder defaults
// =============================================================================

/// Capacity of the queue feeding the proxy completion recorder
pub const RECORDER_QUEUE_CAPACITY: usize = 8192;

/// Dropped records between two overflow warnings
pub const RECORDER_DROP_LOG_EVERY: u64 = 1024;
