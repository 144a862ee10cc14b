// Router metrics - connection lifecycle and per-endpoint response tracking
//
// Connection events land in two "instant" counters that only describe the
// current period. Once per period `aggregate` folds them into the cumulative
// `*-total` counters and the `*-gauge` gauges, then resets them.

pub mod tls;

use std::sync::Arc;
use std::time::Duration;

use crate::constants::ROUTER_PREFIX;
use crate::metrics::{Counter, Gauge, Histogram};
use crate::registry::Registry;
pub use tls::TlsInfo;

/// Join label segments into a dotted metric name
pub(crate) fn join_labels(labels: &[&str]) -> String {
    labels.join(".")
}

/// Metrics collector for the router layer
#[derive(Debug)]
pub struct RouterMetrics {
    registry: Registry,
    connected: Arc<Counter>,
    disconnected: Arc<Counter>,
    connected_total: Arc<Counter>,
    disconnected_total: Arc<Counter>,
    connected_gauge: Arc<Gauge>,
    disconnected_gauge: Arc<Gauge>,
}

impl RouterMetrics {
    /// Create the collector under `<parent>router.`
    pub fn new(parent: &Registry) -> Self {
        let registry = parent.child(ROUTER_PREFIX);
        Self {
            connected: registry.counter("connected"),
            disconnected: registry.counter("disconnected"),
            connected_total: registry.counter("connected-total"),
            disconnected_total: registry.counter("disconnected-total"),
            connected_gauge: registry.gauge("connected-gauge"),
            disconnected_gauge: registry.gauge("disconnected-gauge"),
            registry,
        }
    }

    /// Scoped registry this collector writes to
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a new connection, labeled by its TLS parameters when present
    pub fn connection(&self, tls: Option<&TlsInfo>) {
        self.connected.inc(1);

        let Some(tls) = tls else {
            return;
        };
        if let Some(version) = tls.version_name() {
            self.counter(&["tls_version", version, "count"]).inc(1);
        }
        if let Some(cipher) = tls.cipher_suite_name() {
            self.counter(&["tls_cipher", cipher, "count"]).inc(1);
        }
    }

    /// Record a finished connection
    pub fn disconnection(&self) {
        self.disconnected.inc(1);
    }

    /// Fold the instant counters into totals and gauges
    ///
    /// Each instant counter is read and zeroed in a single atomic swap, so an
    /// event racing with the fold is counted in exactly one period.
    pub fn aggregate(&self) {
        let connected = self.connected.take();
        self.connected_gauge.update(connected as i64);
        self.connected_total.inc(connected);

        let disconnected = self.disconnected.take();
        self.disconnected_gauge.update(disconnected as i64);
        self.disconnected_total.inc(disconnected);
    }

    /// Pre-create the response metrics of an endpoint
    ///
    /// Call once per endpoint name when the handler is built so the first
    /// requests do not contend on registry insertion.
    pub fn register_response_writer_metrics(&self, name: &str) {
        self.counter(&["response", name, "status"]);
        self.histogram(&["response", name, "size"]);
        self.histogram(&["response", name, "time"]);
    }

    /// Record one completed response of endpoint `name`
    pub fn record_response(&self, name: &str, status: u16, size: u64, elapsed: Duration) {
        let status = status.to_string();
        self.counter(&["response", name, "status", &status, "count"])
            .inc(1);
        self.histogram(&["response", name, "size"])
            .update(i64::try_from(size).unwrap_or(i64::MAX));
        self.histogram(&["response", name, "time"])
            .update(i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX));
    }

    /// Get or register a counter named by the joined labels
    pub fn counter(&self, labels: &[&str]) -> Arc<Counter> {
        self.registry.counter(&join_labels(labels))
    }

    /// Get or register a histogram named by the joined labels
    pub fn histogram(&self, labels: &[&str]) -> Arc<Histogram> {
        self.registry.histogram(&join_labels(labels))
    }

    pub fn connected_total(&self) -> u64 {
        self.connected_total.count()
    }

    pub fn disconnected_total(&self) -> u64 {
        self.disconnected_total.count()
    }
}
