//! Immutable point-in-time snapshot of a registry
//!
//! A `Stats` value is built by one full registry walk and never mutated
//! afterwards. The aggregator replaces the published snapshot wholesale on
//! every tick; nothing is merged incrementally.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metrics::{HistogramSnapshot, Metric};
use crate::registry::Registry;

/// Snapshot of every metric in a registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Capture time, nanoseconds since the Unix epoch
    pub time: i64,
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
    pub histograms: BTreeMap<String, HistogramData>,
}

/// Summary of one histogram inside a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramData {
    pub count: u64,
    pub max: i64,
    pub min: i64,
    pub sum: i64,
    pub mean: f64,
    pub stddev: f64,
    pub variance: f64,
    /// Values at `constants::PERCENTILES`, same order
    pub percentiles: Vec<f64>,
}

impl From<HistogramSnapshot> for HistogramData {
    fn from(snap: HistogramSnapshot) -> Self {
        Self {
            count: snap.count,
            max: snap.max,
            min: snap.min,
            sum: snap.sum,
            mean: snap.mean,
            stddev: snap.stddev,
            variance: snap.variance,
            percentiles: snap.percentiles,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    /// Empty snapshot stamped with the current time
    pub fn new() -> Self {
        Self {
            time: now_nanos(),
            counters: BTreeMap::new(),
            gauges: BTreeMap::new(),
            histograms: BTreeMap::new(),
        }
    }

    /// Walk `registry` and summarize every metric it holds
    pub fn capture(registry: &Registry) -> Self {
        let mut stats = Self::new();
        registry.each(|name, metric| match metric {
            Metric::Counter(counter) => {
                stats.counters.insert(name.to_string(), counter.count());
            }
            Metric::Gauge(gauge) => {
                stats.gauges.insert(name.to_string(), gauge.value());
            }
            Metric::Histogram(histogram) => {
                stats
                    .histograms
                    .insert(name.to_string(), histogram.snapshot().into());
            }
        });
        stats
    }

    /// Number of metrics in the snapshot
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.histograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
