// Proxy metrics - per (layer, name) request counters and latency histograms
//
// The dispatch pipeline is modeled as type-erased async functions so the
// instrumentation can wrap any dispatcher without knowing what it does.

pub mod backend;
pub mod recorder;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{HeaderMap, Method};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{BackendConfig, EndpointConfig};
use crate::constants::{PROXY_PREFIX, RECORDER_QUEUE_CAPACITY};
use crate::metrics::{Counter, Histogram};
use crate::registry::Registry;
use crate::router::join_labels;
use recorder::{Record, Recorder};

/// Errors produced by the dispatch pipeline
///
/// Instrumented dispatchers pass these through untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    #[error("too many proxies for this proxy middleware")]
    TooManyProxies,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Request travelling through the dispatch pipeline
#[derive(Debug, Clone, Default)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub params: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Status and headers of the response a backend returned
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub status_code: u16,
    pub headers: HeaderMap,
}

/// Response produced by a dispatcher
#[derive(Debug, Clone, Default)]
pub struct ProxyResponse {
    pub data: serde_json::Map<String, serde_json::Value>,
    pub is_complete: bool,
    pub metadata: ResponseMetadata,
}

/// Result of one dispatch
pub type ProxyResult = Result<ProxyResponse, ProxyError>;

/// A request dispatcher
pub type Proxy = Arc<dyn Fn(ProxyRequest) -> BoxFuture<'static, ProxyResult> + Send + Sync>;

/// Decorator over downstream dispatchers
pub type Middleware = Arc<dyn Fn(&[Proxy]) -> Proxy + Send + Sync>;

/// Builds the dispatcher of an endpoint
pub type ProxyFactory =
    Arc<dyn Fn(&EndpointConfig) -> Result<Proxy, ProxyError> + Send + Sync>;

/// Builds the dispatcher of a backend
pub type BackendFactory = Arc<dyn Fn(&BackendConfig) -> Proxy + Send + Sync>;

/// Wrap an async function as a `Proxy`
pub fn proxy_fn<F, Fut>(f: F) -> Proxy
where
    F: Fn(ProxyRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProxyResult> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}

/// Metrics collector for the proxy layer
#[derive(Debug)]
pub struct ProxyMetrics {
    registry: Registry,
    recorder: Recorder,
}

impl ProxyMetrics {
    /// Create the collector under `<parent>proxy.`
    ///
    /// Completions are recorded by a background task when a tokio runtime is
    /// running, inline otherwise.
    pub fn new(parent: &Registry) -> Self {
        let registry = parent.child(PROXY_PREFIX);
        let dropped = registry.counter("recorder.dropped");
        Self {
            recorder: Recorder::new(RECORDER_QUEUE_CAPACITY, dropped),
            registry,
        }
    }

    /// Collector that records every completion synchronously
    pub fn new_inline(parent: &Registry) -> Self {
        let registry = parent.child(PROXY_PREFIX);
        let dropped = registry.counter("recorder.dropped");
        Self {
            recorder: Recorder::inline(dropped),
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get or register a counter named by the joined labels
    pub fn counter(&self, labels: &[&str]) -> Arc<Counter> {
        self.registry.counter(&join_labels(labels))
    }

    /// Get or register a histogram named by the joined labels
    pub fn histogram(&self, labels: &[&str]) -> Arc<Histogram> {
        self.registry.histogram(&join_labels(labels))
    }

    /// Wait for every completion submitted so far to be applied
    pub async fn flush(&self) {
        self.recorder.flush().await;
    }

    pub(crate) fn submit(&self, record: Record) {
        self.recorder.submit(record);
    }
}

/// Label suffix shared by the request counter and latency histogram
pub fn completion_labels(layer: &str, name: &str, complete: bool, errored: bool) -> String {
    format!(
        "layer.{}.name.{}.complete.{}.error.{}",
        layer, name, complete, errored
    )
}

/// Counter and histogram of one (complete, error) combination
#[derive(Debug, Clone)]
struct Slot {
    requests: Arc<Counter>,
    latency: Arc<Histogram>,
}

/// Instrumentation decorator for a single downstream dispatcher
///
/// Construction registers all four (complete, error) combinations up front;
/// the wrapped dispatcher then only clones handles on the request path.
#[derive(Clone)]
pub struct ProxyMiddleware {
    layer: Arc<str>,
    name: Arc<str>,
    slots: Arc<[Slot; 4]>,
    metrics: Arc<ProxyMetrics>,
}

impl std::fmt::Debug for ProxyMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyMiddleware")
            .field("layer", &self.layer)
            .field("name", &self.name)
            .finish()
    }
}

fn slot_index(complete: bool, errored: bool) -> usize {
    (usize::from(complete) << 1) | usize::from(errored)
}

impl ProxyMiddleware {
    pub fn new(layer: &str, name: &str, metrics: Arc<ProxyMetrics>) -> Self {
        let slot = |complete: bool, errored: bool| {
            let labels = completion_labels(layer, name, complete, errored);
            Slot {
                requests: metrics.counter(&["requests", &labels]),
                latency: metrics.histogram(&["latency", &labels]),
            }
        };
        // order matches slot_index
        let slots = [
            slot(false, false),
            slot(false, true),
            slot(true, false),
            slot(true, true),
        ];

        Self {
            layer: Arc::from(layer),
            name: Arc::from(name),
            slots: Arc::new(slots),
            metrics,
        }
    }

    /// Wrap the downstream dispatcher
    ///
    /// # Panics
    ///
    /// Panics unless exactly one dispatcher is supplied: a multi-fan-in call
    /// site is a structural bug, not a runtime condition.
    pub fn apply(&self, next: &[Proxy]) -> Proxy {
        let next = match next {
            [next] => Arc::clone(next),
            _ => panic!("{}", ProxyError::TooManyProxies),
        };

        let slots = Arc::clone(&self.slots);
        let metrics = Arc::clone(&self.metrics);
        Arc::new(move |request: ProxyRequest| {
            let next = Arc::clone(&next);
            let slots = Arc::clone(&slots);
            let metrics = Arc::clone(&metrics);
            async move {
                let begin = Instant::now();
                let result = next(request).await;
                let elapsed = begin.elapsed();

                let complete = matches!(&result, Ok(response) if response.is_complete);
                let slot = &slots[slot_index(complete, result.is_err())];
                metrics.submit(Record::new(
                    Arc::clone(&slot.requests),
                    Arc::clone(&slot.latency),
                    elapsed,
                ));

                result
            }
            .boxed()
        })
    }

    /// Type-erased form usable wherever a `Middleware` is expected
    pub fn into_middleware(self) -> Middleware {
        Arc::new(move |next: &[Proxy]| self.apply(next))
    }
}

/// Build an instrumentation middleware for `(layer, name)`
pub fn new_proxy_middleware(layer: &str, name: &str, metrics: &Arc<ProxyMetrics>) -> Middleware {
    ProxyMiddleware::new(layer, name, Arc::clone(metrics)).into_middleware()
}

/// Wrap a proxy factory so every endpoint dispatcher it builds is instrumented
///
/// Dispatchers are labeled `layer = segment`, `name = endpoint`.
pub fn instrument_proxy_factory(
    metrics: &Arc<ProxyMetrics>,
    segment: &str,
    next: ProxyFactory,
) -> ProxyFactory {
    let metrics = Arc::clone(metrics);
    let segment = segment.to_string();
    Arc::new(move |cfg: &EndpointConfig| {
        let proxy = next(cfg)?;
        Ok(ProxyMiddleware::new(&segment, &cfg.endpoint, Arc::clone(&metrics)).apply(&[proxy]))
    })
}

/// Wrap a backend factory so every backend dispatcher it builds is instrumented
///
/// Dispatchers are labeled `layer = segment`, `name = url_pattern`.
pub fn instrument_backend_factory(
    metrics: &Arc<ProxyMetrics>,
    segment: &str,
    next: BackendFactory,
) -> BackendFactory {
    let metrics = Arc::clone(metrics);
    let segment = segment.to_string();
    Arc::new(move |cfg: &BackendConfig| {
        let proxy = next(cfg);
        ProxyMiddleware::new(&segment, &cfg.url_pattern, Arc::clone(&metrics)).apply(&[proxy])
    })
}
