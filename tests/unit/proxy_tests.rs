// Proxy metrics unit tests
// Instrumented dispatchers under concurrent load and every label combination

use gatewatch::metrics::Metric;
use gatewatch::proxy::{
    completion_labels, new_proxy_middleware, proxy_fn, ProxyError, ProxyMetrics, ProxyRequest,
    ProxyResponse,
};
use gatewatch::registry::Registry;
use http::Method;
use std::sync::Arc;

fn counter(registry: &Registry, name: &str) -> u64 {
    match registry.get(name) {
        Some(Metric::Counter(c)) => c.count(),
        other => panic!("{} is not a counter: {:?}", name, other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatches_are_all_recorded() {
    // Test: 8 tasks x 100 calls through one middleware, then flush
    let registry = Registry::new();
    let metrics = Arc::new(ProxyMetrics::new(&registry));
    let mw = new_proxy_middleware("backend", "users", &metrics);
    let proxy = mw(&[proxy_fn(|_request| async {
        Ok(ProxyResponse {
            is_complete: true,
            ..ProxyResponse::default()
        })
    })]);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                for _ in 0..100 {
                    proxy(ProxyRequest::new(Method::GET, "/users")).await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    metrics.flush().await;

    assert_eq!(
        counter(
            &registry,
            "proxy.requests.layer.backend.name.users.complete.true.error.false"
        ),
        800
    );
    let latency = metrics
        .histogram(&["latency", &completion_labels("backend", "users", true, false)])
        .snapshot();
    assert_eq!(latency.count, 800);
    assert_eq!(counter(&registry, "proxy.recorder.dropped"), 0);
}

#[tokio::test]
async fn test_incomplete_responses_are_labeled() {
    let registry = Registry::new();
    let metrics = Arc::new(ProxyMetrics::new(&registry));
    let mw = new_proxy_middleware("pipe", "/partial", &metrics);
    let proxy = mw(&[proxy_fn(|_request| async { Ok(ProxyResponse::default()) })]);

    let response = proxy(ProxyRequest::default()).await.unwrap();
    metrics.flush().await;

    assert!(!response.is_complete);
    assert_eq!(
        counter(
            &registry,
            "proxy.requests.layer.pipe.name./partial.complete.false.error.false"
        ),
        1
    );
    assert_eq!(
        counter(
            &registry,
            "proxy.requests.layer.pipe.name./partial.complete.true.error.false"
        ),
        0
    );
}

#[tokio::test]
async fn test_errors_reach_the_caller_unchanged() {
    let registry = Registry::new();
    let metrics = Arc::new(ProxyMetrics::new(&registry));
    let mw = new_proxy_middleware("backend", "orders", &metrics);
    let proxy = mw(&[proxy_fn(|_request| async { Err(ProxyError::Timeout) })]);

    for _ in 0..3 {
        assert_eq!(
            proxy(ProxyRequest::default()).await.unwrap_err(),
            ProxyError::Timeout
        );
    }
    metrics.flush().await;

    assert_eq!(
        counter(
            &registry,
            "proxy.requests.layer.backend.name.orders.complete.false.error.true"
        ),
        3
    );
}

#[test]
fn test_inline_recording_without_runtime() {
    let registry = Registry::new();
    let metrics = Arc::new(ProxyMetrics::new(&registry));
    let mw = new_proxy_middleware("backend", "sync", &metrics);
    let proxy = mw(&[proxy_fn(|_request| async {
        Ok(ProxyResponse {
            is_complete: true,
            ..ProxyResponse::default()
        })
    })]);

    futures::executor::block_on(proxy(ProxyRequest::default())).unwrap();

    assert_eq!(
        counter(
            &registry,
            "proxy.requests.layer.backend.name.sync.complete.true.error.false"
        ),
        1
    );
}

#[test]
#[should_panic(expected = "too many proxies")]
fn test_zero_downstreams_is_a_programming_error() {
    let registry = Registry::new();
    let metrics = Arc::new(ProxyMetrics::new_inline(&registry));
    let mw = new_proxy_middleware("backend", "none", &metrics);
    let _ = mw(&[]);
}
