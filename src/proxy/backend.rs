// Default HTTP backend - plain HTTP/1.1 dispatcher decoding JSON object bodies

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

use super::{BackendFactory, Proxy, ProxyError, ProxyRequest, ProxyResponse, ProxyResult};
use super::{proxy_fn, ResponseMetadata};
use crate::config::BackendConfig;

/// Timeout applied to a whole backend exchange
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Factory of dispatchers talking HTTP/1.1 to the first host of each backend
pub fn http_backend_factory(timeout: Duration) -> BackendFactory {
    Arc::new(move |cfg: &BackendConfig| http_backend(cfg, timeout))
}

/// Dispatcher for a single backend
pub fn http_backend(cfg: &BackendConfig, timeout: Duration) -> Proxy {
    let host = cfg.host.first().cloned().unwrap_or_default();
    let url_pattern = cfg.url_pattern.clone();

    proxy_fn(move |request: ProxyRequest| {
        let host = host.clone();
        let url_pattern = url_pattern.clone();
        async move {
            match tokio::time::timeout(timeout, fetch(&host, &url_pattern, request)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(host = %host, path = %url_pattern, "Backend request timed out");
                    Err(ProxyError::Timeout)
                }
            }
        }
    })
}

/// Strip the scheme from a backend host, rejecting anything but plain HTTP
fn authority(host: &str) -> Result<&str, ProxyError> {
    if host.is_empty() {
        return Err(ProxyError::Backend("backend has no host".to_string()));
    }
    if let Some(rest) = host.strip_prefix("http://") {
        return Ok(rest.trim_end_matches('/'));
    }
    if host.contains("://") {
        return Err(ProxyError::Http(format!("unsupported scheme in {}", host)));
    }
    Ok(host.trim_end_matches('/'))
}

/// Replace `{param}` placeholders with request parameters
pub fn expand_url_pattern(pattern: &str, request: &ProxyRequest) -> String {
    let mut path = pattern.to_string();
    for (key, value) in &request.params {
        path = path.replace(&format!("{{{}}}", key), value);
    }
    match &request.query {
        Some(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path,
    }
}

async fn fetch(host: &str, url_pattern: &str, request: ProxyRequest) -> ProxyResult {
    let address = authority(host)?;
    let path = expand_url_pattern(url_pattern, &request);

    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| ProxyError::Backend(format!("connect {}: {}", address, e)))?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ProxyError::Http(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "Backend connection closed with error");
        }
    });

    let mut builder = http::Request::builder()
        .method(request.method.clone())
        .uri(path.as_str())
        .header(http::header::HOST, address);
    for (name, value) in &request.headers {
        if *name != http::header::HOST {
            builder = builder.header(name, value);
        }
    }
    let outgoing = builder
        .body(Full::new(request.body.clone()))
        .map_err(|e| ProxyError::Http(e.to_string()))?;

    let response = sender
        .send_request(outgoing)
        .await
        .map_err(|e| ProxyError::Http(e.to_string()))?;
    let (parts, body) = response.into_parts();
    let status = parts.status;
    if !status.is_success() {
        return Err(ProxyError::Backend(format!(
            "{} answered {}",
            address,
            status.as_u16()
        )));
    }

    let bytes: Bytes = body
        .collect()
        .await
        .map_err(|e| ProxyError::Http(e.to_string()))?
        .to_bytes();
    let data = decode_object(&bytes)?;

    Ok(ProxyResponse {
        data,
        is_complete: true,
        metadata: ResponseMetadata {
            status_code: status.as_u16(),
            headers: parts.headers,
        },
    })
}

/// Decode a JSON object body; an empty body decodes to an empty object
fn decode_object(body: &[u8]) -> Result<serde_json::Map<String, serde_json::Value>, ProxyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProxyError::Decode(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ProxyError::Decode(e.to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
