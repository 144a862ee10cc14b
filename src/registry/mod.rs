//! Hierarchical metric registry
//!
//! Every metric lives in one flat map keyed by its full dotted name. A scoped
//! child registry is just a handle carrying a longer prefix over the same map,
//! so nesting `gatewatch.` -> `router.` -> `response.<endpoint>.` costs one
//! string concatenation at registration time and nothing per level afterwards.
//!
//! Registration is get-or-register: the first caller for a name builds the
//! metric, every other caller (including racing ones) gets the same handle.
//!
//! A registry is either live or null. The null variant accepts every write
//! and keeps nothing; it backs the inert collector used when metrics are not
//! configured.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::metrics::{Counter, Gauge, Histogram, Metric, MetricKind};

type Store = RwLock<HashMap<String, Metric>>;

#[derive(Clone)]
enum Backing {
    Live(Arc<Store>),
    Null,
}

/// Cloneable handle to a (possibly prefixed) view of a metric namespace
#[derive(Clone)]
pub struct Registry {
    backing: Backing,
    prefix: Arc<str>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("prefix", &self.prefix)
            .field("null", &self.is_null())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Empty live registry without a prefix
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Empty live registry whose names all start with `prefix`
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            backing: Backing::Live(Arc::new(RwLock::new(HashMap::new()))),
            prefix: Arc::from(prefix),
        }
    }

    /// Registry that discards everything written to it
    pub fn null() -> Self {
        Self {
            backing: Backing::Null,
            prefix: Arc::from(""),
        }
    }

    /// Scoped view sharing this registry's storage
    ///
    /// Names registered through the child are stored as
    /// `<parent prefix><prefix><name>`.
    pub fn child(&self, prefix: &str) -> Self {
        let mut full = String::with_capacity(self.prefix.len() + prefix.len());
        full.push_str(&self.prefix);
        full.push_str(prefix);
        Self {
            backing: self.backing.clone(),
            prefix: Arc::from(full),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_null(&self) -> bool {
        matches!(self.backing, Backing::Null)
    }

    /// Full name a leaf name resolves to in this view
    pub fn full_name(&self, name: &str) -> String {
        let mut full = String::with_capacity(self.prefix.len() + name.len());
        full.push_str(&self.prefix);
        full.push_str(name);
        full
    }

    /// Return the metric registered under `name`, creating it with `factory`
    /// if absent
    ///
    /// Idempotent and safe under concurrent first registration: `factory`
    /// runs at most once per full name and every caller receives a handle to
    /// the same metric.
    pub fn get_or_register<F>(&self, name: &str, factory: F) -> Metric
    where
        F: FnOnce() -> Metric,
    {
        let store = match &self.backing {
            Backing::Live(store) => store,
            Backing::Null => return factory(),
        };
        let full = self.full_name(name);

        if let Some(metric) = store.read().get(&full) {
            return metric.clone();
        }

        store.write().entry(full).or_insert_with(factory).clone()
    }

    /// Metric registered under `name`, if any
    pub fn get(&self, name: &str) -> Option<Metric> {
        match &self.backing {
            Backing::Live(store) => store.read().get(&self.full_name(name)).cloned(),
            Backing::Null => None,
        }
    }

    /// Get or register a counter
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        match self.get_or_register(name, Metric::counter) {
            Metric::Counter(counter) => counter,
            other => {
                self.kind_mismatch(name, MetricKind::Counter, &other);
                Arc::new(Counter::new())
            }
        }
    }

    /// Get or register a gauge
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        match self.get_or_register(name, Metric::gauge) {
            Metric::Gauge(gauge) => gauge,
            other => {
                self.kind_mismatch(name, MetricKind::Gauge, &other);
                Arc::new(Gauge::new())
            }
        }
    }

    /// Get or register a histogram with the default reservoir size
    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        match self.get_or_register(name, Metric::histogram) {
            Metric::Histogram(histogram) => histogram,
            other => {
                self.kind_mismatch(name, MetricKind::Histogram, &other);
                Arc::new(Histogram::new())
            }
        }
    }

    // Writes to the detached metric handed back are dropped; the caller's
    // control flow must not notice the clash.
    fn kind_mismatch(&self, name: &str, wanted: MetricKind, found: &Metric) {
        tracing::warn!(
            metric = %self.full_name(name),
            wanted = %wanted,
            registered = %found.kind(),
            "Metric already registered with a different kind; writes will be discarded"
        );
    }

    /// Visit every metric visible through this view, by full name
    ///
    /// Entries are copied out first, so the visitor runs without holding the
    /// registry lock and may itself register metrics. Order is unspecified.
    pub fn each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Metric),
    {
        for (name, metric) in self.entries() {
            visitor(&name, &metric);
        }
    }

    /// Point-in-time copy of every (full name, metric) pair in this view
    pub fn entries(&self) -> Vec<(String, Metric)> {
        let store = match &self.backing {
            Backing::Live(store) => store,
            Backing::Null => return Vec::new(),
        };
        store
            .read()
            .iter()
            .filter(|(name, _)| name.starts_with(&*self.prefix))
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect()
    }

    /// Number of metrics visible through this view
    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Live(store) => store
                .read()
                .keys()
                .filter(|name| name.starts_with(&*self.prefix))
                .count(),
            Backing::Null => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
