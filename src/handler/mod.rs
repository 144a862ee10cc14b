// HTTP instrumentation - wraps endpoint handlers with router metrics
//
// An instrumented handler reports a connection, runs the wrapped handler,
// records status, body size and latency of the response under the endpoint
// name it was built for, then reports the disconnection.

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Body;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::config::EndpointConfig;
use crate::proxy::Proxy;
use crate::router::{RouterMetrics, TlsInfo};

/// An endpoint handler
pub type HandlerFn =
    Arc<dyn Fn(Request<Bytes>) -> BoxFuture<'static, Response<Full<Bytes>>> + Send + Sync>;

/// Builds the handler of an endpoint around its dispatcher
pub type HandlerFactory = Arc<dyn Fn(&EndpointConfig, Proxy) -> HandlerFn + Send + Sync>;

/// Wrap an async function as a `HandlerFn`
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}

/// Body length in bytes, when known up front
fn body_size(response: &Response<Full<Bytes>>) -> u64 {
    let hint = response.body().size_hint();
    hint.exact().unwrap_or_else(|| hint.lower())
}

/// Instrument `next` as the handler of endpoint `name`
///
/// The endpoint's response metrics are registered here, once, rather than on
/// the first request. The response itself is passed through untouched.
pub fn new_http_handler(name: &str, next: HandlerFn, metrics: &Arc<RouterMetrics>) -> HandlerFn {
    metrics.register_response_writer_metrics(name);

    let name: Arc<str> = Arc::from(name);
    let metrics = Arc::clone(metrics);
    Arc::new(move |request: Request<Bytes>| {
        let next = Arc::clone(&next);
        let name = Arc::clone(&name);
        let metrics = Arc::clone(&metrics);
        async move {
            let begin = Instant::now();
            metrics.connection(request.extensions().get::<TlsInfo>());

            let response = next(request).await;

            metrics.record_response(
                &name,
                response.status().as_u16(),
                body_size(&response),
                begin.elapsed(),
            );
            metrics.disconnection();
            response
        }
        .boxed()
    })
}

/// Wrap a handler factory so every handler it builds is instrumented under
/// its endpoint pattern
pub fn new_http_handler_factory(next: HandlerFactory, metrics: &Arc<RouterMetrics>) -> HandlerFactory {
    let metrics = Arc::clone(metrics);
    Arc::new(move |cfg: &EndpointConfig, proxy: Proxy| {
        new_http_handler(&cfg.endpoint, next(cfg, proxy), &metrics)
    })
}
