// Stats endpoint integration tests
//
// Serves the export endpoint on an ephemeral port and queries it over HTTP:
// - zero-traffic document carries metadata and zero-valued metrics
// - recorded traffic shows up after an aggregation cycle
// - wrong path / method handling
// - shutdown closes lingering connections after the grace period

use super::test_harness::{metrics_with, EndpointHarness};
use bytes::Bytes;
use gatewatch::exporter::{self, ExportDocument};
use gatewatch::handler::handler_fn;
use gatewatch::MetricsError;
use http::{Request, Response};
use http_body_util::Full;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_no_traffic_document_has_metadata_and_zero_values() {
    let harness = EndpointHarness::start(metrics_with(json!({}))).await;

    let response = reqwest::get(harness.url("/__stats")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));

    let doc: ExportDocument = response.json().await.unwrap();
    assert!(!doc.cmdline.is_empty());
    assert!(!doc.started_at.is_empty());
    assert!(doc.stats.time > 0);
    assert!(doc.stats.counters.contains_key("gatewatch.router.connected-total"));
    assert!(doc.stats.counters.values().all(|v| *v == 0));
    assert!(doc.stats.gauges.values().all(|v| *v == 0));
    assert!(doc.stats.histograms.values().all(|h| h.count == 0));

    harness.stop().await;
}

#[tokio::test]
async fn test_traffic_is_exported_after_aggregation() {
    let harness = EndpointHarness::start(metrics_with(json!({}))).await;
    let handler = harness.metrics.new_http_handler(
        "/test/{var}",
        handler_fn(|_request| async { Response::new(Full::new(Bytes::from_static(b"hello"))) }),
    );

    for i in 0..100 {
        let request = Request::builder()
            .uri(format!("/test/{}", i))
            .body(Bytes::new())
            .unwrap();
        handler(request).await;
    }
    harness.metrics.collect();

    let doc: ExportDocument = reqwest::get(harness.url("/__stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let counters = &doc.stats.counters;
    assert_eq!(counters["gatewatch.router.response./test/{var}.status.200.count"], 100);
    assert_eq!(counters["gatewatch.router.connected-total"], 100);
    assert_eq!(counters["gatewatch.router.disconnected-total"], 100);
    assert_eq!(counters["gatewatch.router.connected"], 0);
    assert_eq!(counters["gatewatch.router.disconnected"], 0);

    let size = &doc.stats.histograms["gatewatch.router.response./test/{var}.size"];
    assert_eq!(size.count, 100);
    assert_eq!(size.max, 5);
    assert_eq!(size.percentiles.len(), 7);
    assert!(doc.stats.gauges.contains_key("gatewatch.service.uptime"));

    harness.stop().await;
}

#[tokio::test]
async fn test_wrong_path_and_method() {
    let harness = EndpointHarness::start(metrics_with(json!({}))).await;
    let client = reqwest::Client::new();

    let response = client.get(harness.url("/stats")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    let response = client.post(harness.url("/__stats")).send().await.unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "GET");

    harness.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_idle_connections_after_grace() {
    let harness = EndpointHarness::start(metrics_with(json!({}))).await;
    let addr = harness.addr;

    // keep-alive client leaves an idle connection open
    let client = reqwest::Client::new();
    let response = client.get(harness.url("/__stats")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let stopped = tokio::time::timeout(Duration::from_secs(3), harness.stop()).await;
    assert!(stopped.is_ok(), "endpoint should stop within the grace period");

    // the listener is gone
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_disabled_endpoint_is_not_served() {
    let metrics = Arc::new(metrics_with(json!({"endpoint_disabled": true})));
    let (_tx, rx) = watch::channel(false);

    assert!(metrics.run_endpoint(rx).is_none());
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let first = exporter::bind("127.0.0.1:0").await.unwrap();
    let taken = first.local_addr().unwrap();

    let err = exporter::bind(&taken.to_string()).await.unwrap_err();
    assert!(matches!(err, MetricsError::Bind { .. }));
}

#[tokio::test]
async fn test_run_endpoint_survives_bind_failure() {
    // Test: the spawned endpoint logs the bind error and ends quietly
    let first = exporter::bind("127.0.0.1:0").await.unwrap();
    let taken = first.local_addr().unwrap();
    let metrics = Arc::new(metrics_with(json!({"listen_address": taken.to_string()})));
    let (_tx, rx) = watch::channel(false);

    let task = metrics.run_endpoint(rx).expect("endpoint task spawned");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("task ends")
        .expect("task does not panic");
}

#[tokio::test]
async fn test_host_name_listen_address_is_served() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let metrics = Arc::new(metrics_with(
        json!({"listen_address": format!("localhost:{}", port)}),
    ));
    let (tx, rx) = watch::channel(false);
    let task = metrics.run_endpoint(rx).expect("endpoint task spawned");

    let url = format!("http://localhost:{}/__stats", port);
    let mut status = None;
    for _ in 0..50 {
        if let Ok(response) = reqwest::get(&url).await {
            status = Some(response.status());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, Some(reqwest::StatusCode::OK));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("endpoint stops")
        .expect("task does not panic");
}

#[test]
fn test_run_endpoint_outside_runtime_returns_none() {
    let metrics = Arc::new(metrics_with(json!({})));
    let (_tx, rx) = watch::channel(false);

    assert!(metrics.run_endpoint(rx).is_none());
}
