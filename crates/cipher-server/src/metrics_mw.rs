//! Per-request metrics: `http_requests_total{method,path}`,
//! `http_responses_total{method,path,status}`, and
//! `http_request_duration_seconds{method,path}` with the standard
//! sub-second-to-10s bucket set. `tower-http`'s `TraceLayer` handles the
//! structured log line; this middleware only owns the Prometheus
//! counters/histogram.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};

pub async fn record(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    counter!("http_requests_total", "method" => method.clone(), "path" => path.clone()).increment(1);

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64();

    histogram!("http_request_duration_seconds", "method" => method.clone(), "path" => path.clone())
        .record(elapsed);
    counter!(
        "http_responses_total",
        "method" => method,
        "path" => path,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    response
}
