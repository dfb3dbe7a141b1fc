//! Request tracing middleware

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Log method, route, client ip, status and latency of every request.
///
/// Query strings are left out since refresh and login payloads must never end
/// up in logs.
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let client_ip = client_ip(request.headers());

    tracing::debug!(method = %method, route = %route, client_ip = ?client_ip, "Request started");

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(method = %method, route = %route, status, duration_ms, "Request failed");
    } else if response.status().is_client_error() {
        tracing::warn!(method = %method, route = %route, status, duration_ms, "Request rejected");
    } else {
        tracing::info!(method = %method, route = %route, status, duration_ms, "Request completed");
    }

    response
}

/// First hop of `x-forwarded-for`, falling back to `x-real-ip`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
    })
}
