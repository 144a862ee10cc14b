// Exporter - serves the latest snapshot as JSON over a single GET endpoint

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::collector::Metrics;
use crate::constants::{SHUTDOWN_GRACE, STATS_PATH};
use crate::error::MetricsError;
use crate::stats::Stats;

/// Document returned by the stats endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Command line of the process
    pub cmdline: Vec<String>,
    /// Seconds since the process started
    pub uptime: u64,
    /// RFC 3339 start time of the process
    pub started_at: String,
    #[serde(flatten)]
    pub stats: Stats,
}

impl ExportDocument {
    /// Latest published snapshot, or a live registry walk before the first tick
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let stats = match metrics.snapshot() {
            Some(latest) => (*latest).clone(),
            None => metrics.take_snapshot(),
        };
        Self {
            cmdline: std::env::args_os()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            uptime: metrics.started().elapsed().as_secs(),
            started_at: metrics.started_at().to_rfc3339(),
            stats,
        }
    }
}

/// Response for one request to the export endpoint
pub fn respond(metrics: &Metrics, method: &Method, path: &str) -> Response<Full<Bytes>> {
    if path != STATS_PATH {
        return plain(StatusCode::NOT_FOUND, "not found");
    }
    if *method != Method::GET {
        let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        response
            .headers_mut()
            .insert(header::ALLOW, header::HeaderValue::from_static("GET"));
        return response;
    }

    match serde_json::to_vec(&ExportDocument::from_metrics(metrics)) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/json; charset=utf-8"),
            );
            response
        }
        Err(e) => {
            let err = MetricsError::from(e);
            tracing::error!(error = %err, "Failed to encode metrics snapshot");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
        }
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Bind the endpoint listener; host names are resolved here
pub async fn bind(address: &str) -> Result<TcpListener, MetricsError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| MetricsError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Serve the export endpoint on `listener` until `shutdown` turns true
///
/// Once shutdown is observed no new connection is accepted; connections
/// still open after the grace period are closed forcibly.
pub async fn serve(listener: TcpListener, metrics: Arc<Metrics>, mut shutdown: watch::Receiver<bool>) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    tracing::info!(listen_address = %local, path = STATS_PATH, "Metrics endpoint listening");

    let mut connections = JoinSet::new();
    if !*shutdown.borrow() {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let metrics = Arc::clone(&metrics);
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, metrics).await {
                                tracing::debug!(peer = %peer, error = %e, "Metrics connection error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Metrics endpoint accept failed");
                    }
                },
                // reap finished connections so the set does not grow
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
    }
    drop(listener);

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::debug!(
            remaining = connections.len(),
            "Closing metrics connections after grace period"
        );
        connections.abort_all();
    }
    tracing::info!(listen_address = %local, "Metrics endpoint stopped");
}

async fn serve_connection(stream: TcpStream, metrics: Arc<Metrics>) -> Result<(), MetricsError> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request: Request<Incoming>| {
        let response = respond(&metrics, request.method(), request.uri().path());
        async move { Ok::<_, Infallible>(response) }
    });
    http1::Builder::new().serve_connection(io, service).await?;
    Ok(())
}

/// Bind `listen_address` and serve until shutdown, on a background task
///
/// Returns `None` when the collector is inert, the endpoint is disabled or
/// no tokio runtime is running. A bind failure is logged and ends the task;
/// it never reaches the caller.
pub fn spawn_endpoint(metrics: &Arc<Metrics>, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
    let cfg = metrics.config()?;
    if cfg.endpoint_disabled {
        tracing::info!("Metrics endpoint disabled");
        return None;
    }
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            tracing::warn!("No tokio runtime available, metrics endpoint not started");
            return None;
        }
    };

    let address = cfg.bind_address();
    let metrics = Arc::clone(metrics);
    Some(handle.spawn(async move {
        match bind(&address).await {
            Ok(listener) => serve(listener, metrics, shutdown).await,
            Err(e) => tracing::error!(error = %e, "Metrics endpoint not started"),
        }
    }))
}
