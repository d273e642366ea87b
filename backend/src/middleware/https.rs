use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, Response, StatusCode, Uri},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;

use crate::AppState;

/// Redirect plain HTTP requests to HTTPS (307, method preserved).
/// A reverse proxy's `X-Forwarded-Proto` wins over the request URI.
pub async fn https_redirect(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let https = &state.config.https;
    if !https.redirect || effective_scheme(&request) == "https" {
        return next.run(request).await;
    }

    let Some(host) = request_host(&request) else {
        tracing::warn!("Cannot redirect to HTTPS without a Host header");
        return next.run(request).await;
    };

    let location = https_location(host, https.port, request.uri());
    tracing::debug!("Redirecting {} to {}", request.uri().path(), location);

    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response()
}

/// Add Strict-Transport-Security to HTTPS responses outside loopback hosts.
pub async fn hsts(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let applies = state.config.https.hsts
        && effective_scheme(&request) == "https"
        && !request_host(&request).map(is_loopback_host).unwrap_or(false);

    let mut response = next.run(request).await;

    if applies {
        let value = format!("max-age={}", state.config.https.hsts_max_age_secs);
        if let Ok(value) = HeaderValue::from_str(&value) {
            response
                .headers_mut()
                .insert(header::STRICT_TRANSPORT_SECURITY, value);
        }
    }

    response
}

fn effective_scheme(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|proto| proto.trim().to_ascii_lowercase())
        .filter(|proto| !proto.is_empty())
        .or_else(|| request.uri().scheme_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "http".to_string())
}

fn request_host(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
        .filter(|host| !host.is_empty())
}

/// Host without its port; IPv6 literals keep their brackets.
fn host_without_port(host: &str) -> &str {
    if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or(host)
    }
}

fn is_loopback_host(host: &str) -> bool {
    matches!(
        host_without_port(host).to_ascii_lowercase().as_str(),
        "localhost" | "127.0.0.1" | "[::1]"
    )
}

fn https_location(host: &str, port: Option<u16>, uri: &Uri) -> String {
    let hostname = host_without_port(host);
    let authority = match port {
        Some(443) | None => hostname.to_string(),
        Some(port) => format!("{}:{}", hostname, port),
    };
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("https://{}{}", authority, path_and_query)
}
