// Default HTTP backend integration tests
// Instrumented backend dispatchers against a local HTTP server

use super::test_harness::{metrics_with, start_backend};
use gatewatch::config::BackendConfig;
use gatewatch::proxy::{ProxyError, ProxyRequest};
use http::{Method, StatusCode};
use serde_json::json;

fn backend(addr: std::net::SocketAddr, url_pattern: &str) -> BackendConfig {
    BackendConfig {
        url_pattern: url_pattern.to_string(),
        host: vec![format!("http://{}", addr)],
    }
}

#[tokio::test]
async fn test_successful_backend_call_is_complete() {
    let (addr, server) = start_backend(StatusCode::OK, r#"{"id":42,"name":"ada"}"#).await;
    let metrics = metrics_with(json!({}));
    let factory = metrics.default_backend_factory();
    let proxy = factory(&backend(addr, "/users/{id}"));

    let mut request = ProxyRequest::new(Method::GET, "/users/42");
    request.params.insert("id".to_string(), "42".to_string());
    let response = proxy(request).await.unwrap();

    assert!(response.is_complete);
    assert_eq!(response.metadata.status_code, 200);
    assert_eq!(response.data["name"], "ada");

    metrics.proxy().flush().await;
    let stats = metrics.take_snapshot();
    assert_eq!(
        stats.counters["gatewatch.proxy.requests.layer.backend.name./users/{id}.complete.true.error.false"],
        1
    );
    server.abort();
}

#[tokio::test]
async fn test_backend_error_status_is_an_error() {
    let (addr, server) = start_backend(StatusCode::SERVICE_UNAVAILABLE, "down").await;
    let metrics = metrics_with(json!({}));
    let proxy = metrics.default_backend_factory()(&backend(addr, "/orders"));

    let err = proxy(ProxyRequest::new(Method::GET, "/orders")).await.unwrap_err();
    assert!(matches!(err, ProxyError::Backend(_)));

    metrics.proxy().flush().await;
    let stats = metrics.take_snapshot();
    assert_eq!(
        stats.counters["gatewatch.proxy.requests.layer.backend.name./orders.complete.false.error.true"],
        1
    );
    server.abort();
}

#[tokio::test]
async fn test_undecodable_body_is_a_decode_error() {
    let (addr, server) = start_backend(StatusCode::OK, "<html>oops</html>").await;
    let metrics = metrics_with(json!({}));
    let proxy = metrics.default_backend_factory()(&backend(addr, "/html"));

    let err = proxy(ProxyRequest::new(Method::GET, "/html")).await.unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
    server.abort();
}

#[tokio::test]
async fn test_backend_disabled_records_nothing() {
    let (addr, server) = start_backend(StatusCode::OK, "{}").await;
    let metrics = metrics_with(json!({"backend_disabled": true}));
    let proxy = metrics.default_backend_factory()(&backend(addr, "/quiet"));

    assert!(proxy(ProxyRequest::new(Method::GET, "/quiet")).await.unwrap().is_complete);

    metrics.proxy().flush().await;
    let stats = metrics.take_snapshot();
    assert!(stats.counters.keys().all(|name| !name.contains("/quiet")));
    server.abort();
}
