// Collector facade - one entry point owning the registry, the collectors,
// the aggregator task and the factory wrappers handed to the gateway

pub mod aggregator;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ExtraConfig, MetricsConfig};
use crate::constants::ROOT_PREFIX;
use crate::handler::{self, HandlerFactory, HandlerFn};
use crate::proxy::backend::{http_backend_factory, DEFAULT_BACKEND_TIMEOUT};
use crate::proxy::{self, BackendFactory, Middleware, Proxy, ProxyError, ProxyFactory, ProxyMetrics};
use crate::registry::Registry;
use crate::resources;
use crate::router::RouterMetrics;
use crate::stats::Stats;
pub use aggregator::Aggregator;

/// Metrics collector of one gateway process
///
/// Built from the gateway's `extra_config`. Without a metrics section the
/// facade is inert: it is backed by a null registry, spawns nothing, and
/// every wrapper it produces returns its input unchanged.
#[derive(Debug)]
pub struct Metrics {
    config: Option<MetricsConfig>,
    registry: Registry,
    router: Arc<RouterMetrics>,
    proxy: Arc<ProxyMetrics>,
    latest: Arc<ArcSwapOption<Stats>>,
    started: Instant,
    started_at: DateTime<Utc>,
    aggregator: Option<JoinHandle<()>>,
}

impl Metrics {
    /// Build the collector and start its aggregator
    ///
    /// The aggregator ticks every `collection_time` until `shutdown` turns
    /// true. It is only started when called inside a tokio runtime.
    pub fn new(extra: &ExtraConfig, shutdown: watch::Receiver<bool>) -> Self {
        let config = MetricsConfig::from_extra_config(extra);
        let mut metrics = Self::build(config);

        if let Some(cfg) = &metrics.config {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let task = metrics.aggregator_state().run(cfg.collection_time, shutdown);
                    metrics.aggregator = Some(handle.spawn(task));
                }
                Err(_) => {
                    tracing::warn!("No tokio runtime available, metrics aggregator not started");
                }
            }
        } else {
            tracing::info!("No metrics configuration found, collector disabled");
        }
        metrics
    }

    /// Build the collector for `config` without starting any task
    pub fn build(config: Option<MetricsConfig>) -> Self {
        let registry = if config.is_some() {
            Registry::with_prefix(ROOT_PREFIX)
        } else {
            Registry::null()
        };

        let (started, started_at) = process_start();
        Self {
            router: Arc::new(RouterMetrics::new(&registry)),
            proxy: Arc::new(if config.is_some() {
                ProxyMetrics::new(&registry)
            } else {
                ProxyMetrics::new_inline(&registry)
            }),
            latest: Arc::new(ArcSwapOption::empty()),
            started,
            started_at,
            aggregator: None,
            config,
            registry,
        }
    }

    /// Inert collector
    pub fn disabled() -> Self {
        Self::build(None)
    }

    pub fn config(&self) -> Option<&MetricsConfig> {
        self.config.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn router(&self) -> &Arc<RouterMetrics> {
        &self.router
    }

    pub fn proxy(&self) -> &Arc<ProxyMetrics> {
        &self.proxy
    }

    /// Process start, as a monotonic instant
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Process start, as wall-clock time
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Last snapshot published by the aggregator, if it has ticked yet
    pub fn snapshot(&self) -> Option<Arc<Stats>> {
        self.latest.load_full()
    }

    /// Walk the registry now, without folding the router counters
    pub fn take_snapshot(&self) -> Stats {
        Stats::capture(&self.registry)
    }

    /// Run one aggregation cycle immediately and publish its snapshot
    pub fn collect(&self) -> Arc<Stats> {
        self.aggregator_state().tick()
    }

    fn aggregator_state(&self) -> Aggregator {
        Aggregator::new(
            self.registry.clone(),
            Arc::clone(&self.router),
            Arc::clone(&self.latest),
            self.started,
        )
    }

    /// Handle of the aggregator task, when one was started
    pub fn aggregator_handle(&mut self) -> Option<JoinHandle<()>> {
        self.aggregator.take()
    }

    /// Serve the stats endpoint on `listen_address` until `shutdown`
    ///
    /// See [`crate::exporter::spawn_endpoint`].
    pub fn run_endpoint(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        crate::exporter::spawn_endpoint(self, shutdown)
    }

    fn router_enabled(&self) -> bool {
        matches!(&self.config, Some(cfg) if !cfg.router_disabled)
    }

    fn proxy_enabled(&self) -> bool {
        matches!(&self.config, Some(cfg) if !cfg.proxy_disabled)
    }

    fn backend_enabled(&self) -> bool {
        matches!(&self.config, Some(cfg) if !cfg.backend_disabled)
    }

    /// Instrumentation middleware for `(layer, name)`
    ///
    /// When the proxy collector is off the middleware hands back its single
    /// downstream dispatcher untouched.
    pub fn new_proxy_middleware(&self, layer: &str, name: &str) -> Middleware {
        if !self.proxy_enabled() {
            return Arc::new(|next: &[Proxy]| match next {
                [next] => Arc::clone(next),
                _ => panic!("{}", ProxyError::TooManyProxies),
            });
        }
        proxy::new_proxy_middleware(layer, name, &self.proxy)
    }

    /// Instrument every endpoint dispatcher `next` builds
    ///
    /// Returns `next` itself when the proxy collector is off.
    pub fn proxy_factory(&self, segment: &str, next: ProxyFactory) -> ProxyFactory {
        if !self.proxy_enabled() {
            return next;
        }
        proxy::instrument_proxy_factory(&self.proxy, segment, next)
    }

    /// Instrument every backend dispatcher `next` builds
    ///
    /// Returns `next` itself when the backend collector is off.
    pub fn backend_factory(&self, segment: &str, next: BackendFactory) -> BackendFactory {
        if !self.backend_enabled() {
            return next;
        }
        proxy::instrument_backend_factory(&self.proxy, segment, next)
    }

    /// Instrumented plain HTTP backend, labeled layer `backend`
    pub fn default_backend_factory(&self) -> BackendFactory {
        self.backend_factory("backend", http_backend_factory(DEFAULT_BACKEND_TIMEOUT))
    }

    /// Instrument the handler of endpoint `name`
    ///
    /// Returns `next` itself when the router collector is off.
    pub fn new_http_handler(&self, name: &str, next: HandlerFn) -> HandlerFn {
        if !self.router_enabled() {
            return next;
        }
        handler::new_http_handler(name, next, &self.router)
    }

    /// Instrument every handler `next` builds
    ///
    /// Returns `next` itself when the router collector is off.
    pub fn new_http_handler_factory(&self, next: HandlerFactory) -> HandlerFactory {
        if !self.router_enabled() {
            return next;
        }
        handler::new_http_handler_factory(next, &self.router)
    }
}

/// Start of the process, falling back to now when the platform cannot tell
fn process_start() -> (Instant, DateTime<Utc>) {
    let now = Instant::now();
    let wall_now = Utc::now();
    let Some(started_at) = resources::process_start_time() else {
        return (now, wall_now);
    };
    let age = (wall_now - started_at).to_std().unwrap_or_default();
    match now.checked_sub(age) {
        Some(started) => (started, started_at),
        None => (now, wall_now),
    }
}
