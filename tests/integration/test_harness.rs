// Test utilities for starting/stopping the stats endpoint and a fake backend

use bytes::Bytes;
use gatewatch::config::{ExtraConfig, MetricsConfig, NAMESPACE};
use gatewatch::exporter;
use gatewatch::Metrics;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Collector configured with `section` as its metrics options
pub fn metrics_with(section: serde_json::Value) -> Metrics {
    let mut extra = ExtraConfig::new();
    extra.insert(NAMESPACE.to_string(), section);
    Metrics::build(MetricsConfig::from_extra_config(&extra))
}

/// Stats endpoint bound to an ephemeral port
pub struct EndpointHarness {
    pub addr: SocketAddr,
    pub metrics: Arc<Metrics>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl EndpointHarness {
    pub async fn start(metrics: Metrics) -> Self {
        let metrics = Arc::new(metrics);
        let listener = exporter::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(exporter::serve(listener, Arc::clone(&metrics), rx));

        Self {
            addr,
            metrics,
            shutdown,
            task: Some(task),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Signal shutdown and wait for the server task to end
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            task.await.expect("endpoint task");
        }
    }
}

/// Minimal HTTP/1.1 backend answering every request with `status` and `body`
pub async fn start_backend(status: StatusCode, body: &'static str) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let service = service_fn(move |_request: Request<Incoming>| async move {
                    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
                    *response.status_mut() = status;
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, task)
}
