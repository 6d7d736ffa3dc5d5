use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Wrap each request in an `http_request` span carrying a trace id.
///
/// The id is taken from an incoming `x-trace-id` header when it is a UUID,
/// generated otherwise, and echoed on the response.  Bodies are never
/// logged; chat traffic carries user content and uploads.
pub async fn trace_middleware(mut req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        let request_bytes = content_length(req.headers());
        info!(request_bytes, "→ request started");

        let header_value = HeaderValue::from_str(&trace_id.to_string()).ok();
        if let Some(value) = header_value.clone() {
            req.headers_mut().insert(X_TRACE_ID, value);
        }

        let mut response = next.run(req).await;

        if let Some(value) = header_value {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            response_bytes = content_length(response.headers()),
            latency_ms = start_time.elapsed().as_millis() as u64,
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

fn content_length(headers: &header::HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
