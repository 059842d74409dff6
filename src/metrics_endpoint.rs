//! Metrics HTTP Endpoint
//!
//! Exposes [`EdgeMetrics`] in Prometheus text format on a separate port,
//! together with a small JSON health check.

use crate::metrics::{EdgeMetrics, MetricsSnapshot};
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

const METRIC_PREFIX: &str = "edge_cache";

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<EdgeMetrics>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    ///
    /// # Example
    /// ```no_run
    /// use edge_image_cache::metrics::EdgeMetrics;
    /// use edge_image_cache::metrics_endpoint::MetricsEndpoint;
    /// use std::sync::Arc;
    ///
    /// let metrics = Arc::new(EdgeMetrics::new());
    /// let endpoint = MetricsEndpoint::new(metrics, "127.0.0.1:9090".parse().unwrap());
    /// ```
    pub fn new(metrics: Arc<EdgeMetrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Start the metrics endpoint server
    ///
    /// Serves `/metrics` and `/health` until the process exits.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics endpoint listening on http://{}/metrics", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&self.metrics);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    async move { handle_request(req, metrics).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<EdgeMetrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path(), &metrics))
}

fn route(path: &str, metrics: &EdgeMetrics) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics.get_stats()),
        ),
        "/health" => respond(
            StatusCode::OK,
            "application/json",
            serde_json::json!({ "status": "healthy" }).to_string(),
        ),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "404 Not Found".to_string()),
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn push_metric(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {}_{} {}", METRIC_PREFIX, name, help);
    let _ = writeln!(out, "# TYPE {}_{} {}", METRIC_PREFIX, name, kind);
    let _ = writeln!(out, "{}_{} {}", METRIC_PREFIX, name, value);
    out.push('\n');
}

/// Format metrics in Prometheus exposition format
pub fn format_prometheus_metrics(s: &MetricsSnapshot) -> String {
    let mut out = String::new();

    push_metric(&mut out, "requests_total", "counter", "Total number of requests processed", s.total_requests);
    push_metric(&mut out, "preflight_requests_total", "counter", "CORS preflight requests answered", s.preflight_requests);
    push_metric(&mut out, "rejected_requests_total", "counter", "Requests rejected with 405", s.rejected_requests);
    push_metric(&mut out, "maintenance_responses_total", "counter", "Out-of-scope paths answered locally", s.maintenance_responses);

    push_metric(&mut out, "cache_hits_total", "counter", "Number of cache hits", s.cache_hits);
    push_metric(&mut out, "cache_misses_total", "counter", "Number of cache misses", s.cache_misses);
    push_metric(&mut out, "cache_errors_total", "counter", "Cache lookups that failed and were served as misses", s.cache_errors);
    push_metric(&mut out, "cache_writes_total", "counter", "Background cache writes completed", s.cache_writes);
    push_metric(&mut out, "cache_write_failures_total", "counter", "Background cache writes that failed", s.cache_write_failures);
    push_metric(&mut out, "cache_hit_rate", "gauge", "Cache hit rate percentage", format!("{:.2}", s.cache_hit_rate()));

    push_metric(&mut out, "origin_fetches_total", "counter", "Requests sent to origin", s.origin_fetches);
    push_metric(&mut out, "origin_error_responses_total", "counter", "Origin responses with a non-2xx status", s.origin_error_responses);
    push_metric(&mut out, "origin_unreachable_total", "counter", "Origin fetches that failed at the transport level", s.origin_unreachable);

    push_metric(&mut out, "bytes_from_origin_total", "counter", "Total bytes received from origin", s.bytes_from_origin);
    push_metric(&mut out, "bytes_from_cache_total", "counter", "Total bytes served from cache", s.bytes_from_cache);
    push_metric(&mut out, "bytes_to_client_total", "counter", "Total bytes sent to clients", s.bytes_to_client);

    push_metric(&mut out, "request_duration_ms_avg", "gauge", "Average request duration in milliseconds", format!("{:.2}", s.avg_request_duration_ms()));
    push_metric(&mut out, "origin_duration_ms_avg", "gauge", "Average origin fetch duration in milliseconds", format!("{:.2}", s.avg_origin_duration_ms()));

    out
}
