use axum::{
    body::Body,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::time::Instant;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tag every response with a request id and log timing and status.
/// Query strings are left out of the log; they carry return targets.
pub async fn request_observability(request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    if status >= 500 {
        tracing::error!(%request_id, %method, %path, status, elapsed_ms, "Request failed");
    } else if status >= 400 {
        tracing::warn!(%request_id, %method, %path, status, elapsed_ms, "Request rejected");
    } else {
        tracing::info!(%request_id, %method, %path, status, elapsed_ms, "Request completed");
    }

    response
}
