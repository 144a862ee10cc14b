// Metrics module - the three metric kinds stored in a registry
// Counters and gauges are single atomics; histograms guard a reservoir sample.

pub mod sample;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::constants::{DEFAULT_SAMPLE_SIZE, PERCENTILES};
pub use sample::{percentile, SampleStats, UniformSample};

/// Non-negative 64-bit accumulator
///
/// Increments are single atomic adds, so concurrent writers never lose updates.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to the counter
    #[inline]
    pub fn inc(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Subtract `n`, saturating at zero
    pub fn dec(&self, n: u64) {
        let _ = self
            .count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(c.saturating_sub(n))
            });
    }

    /// Current value
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Reset to zero
    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }

    /// Read the current value and reset to zero in one atomic step
    pub fn take(&self) -> u64 {
        self.count.swap(0, Ordering::AcqRel)
    }
}

/// Single 64-bit scalar, last write wins
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value
    #[inline]
    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Distribution summary backed by a bounded uniform sample
#[derive(Debug)]
pub struct Histogram {
    sample: Mutex<UniformSample>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_SIZE)
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Histogram whose reservoir retains at most `capacity` values
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sample: Mutex::new(UniformSample::new(capacity)),
        }
    }

    /// Record one observation
    #[inline]
    pub fn update(&self, value: i64) {
        self.sample.lock().update(value);
    }

    /// Total observations recorded (including evicted ones)
    pub fn count(&self) -> u64 {
        self.sample.lock().count()
    }

    pub fn clear(&self) {
        self.sample.lock().clear();
    }

    /// Point-in-time summary using the standard percentile set
    pub fn snapshot(&self) -> HistogramSnapshot {
        self.snapshot_with(&PERCENTILES)
    }

    /// Point-in-time summary at arbitrary quantiles
    pub fn snapshot_with(&self, quantiles: &[f64]) -> HistogramSnapshot {
        // Copy out under the lock, sort and reduce outside it
        let (count, values) = {
            let sample = self.sample.lock();
            (sample.count(), sample.values())
        };
        let stats = SampleStats::compute(values, quantiles);
        HistogramSnapshot {
            count,
            max: stats.max,
            min: stats.min,
            sum: stats.sum,
            mean: stats.mean,
            stddev: stats.stddev,
            variance: stats.variance,
            percentiles: stats.percentiles,
        }
    }
}

/// Immutable summary of a histogram at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub max: i64,
    pub min: i64,
    pub sum: i64,
    pub mean: f64,
    pub stddev: f64,
    pub variance: f64,
    pub percentiles: Vec<f64>,
}

/// Kind tag of a registered metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

/// A registered metric: shared handle to one of the three kinds
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
}

impl Metric {
    pub fn counter() -> Self {
        Metric::Counter(Arc::new(Counter::new()))
    }

    pub fn gauge() -> Self {
        Metric::Gauge(Arc::new(Gauge::new()))
    }

    pub fn histogram() -> Self {
        Metric::Histogram(Arc::new(Histogram::new()))
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
        }
    }

    /// True when both handles point at the same underlying metric
    pub fn same_as(&self, other: &Metric) -> bool {
        match (self, other) {
            (Metric::Counter(a), Metric::Counter(b)) => Arc::ptr_eq(a, b),
            (Metric::Gauge(a), Metric::Gauge(b)) => Arc::ptr_eq(a, b),
            (Metric::Histogram(a), Metric::Histogram(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
