use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::auth::jwt::Claims;
use crate::auth::middleware::{OptionalSessionUser, SessionUser};
use crate::error::AppError;
use crate::AppState;

const SECURE_PATH: &str = "/Home/Secure";

pub fn home_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(home))
        .route(SECURE_PATH, get(secure))
        .route("/Home/Error", get(error_page))
}

pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({"status": "healthy", "service": "idp-initiated-sp"})))
}

async fn home(OptionalSessionUser(user): OptionalSessionUser) -> Html<String> {
    let body = match user {
        Some(claims) => format!(
            "<p>Signed in as <strong>{}</strong> via {}.</p>\n<p><a href=\"{}\">Secure page</a></p>\n{}",
            escape_html(&claims.sub),
            escape_html(&claims.idp),
            SECURE_PATH,
            SIGN_OUT_FORM
        ),
        None => "<p>You are not signed in.</p>\n<p><a href=\"/Saml2/SignIn\">Sign in</a></p>".to_string(),
    };

    page("Home", &body)
}

/// Requires a session; anonymous users are challenged through SP-initiated sign-in.
async fn secure(session: Result<SessionUser, AppError>) -> Response {
    let claims = match session {
        Ok(SessionUser(claims)) => claims,
        Err(e) => {
            tracing::debug!(reason = e.error_code(), "Challenging request for {}", SECURE_PATH);
            let location = format!("/Saml2/SignIn?ReturnUrl={}", urlencoding::encode(SECURE_PATH));
            return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
        }
    };

    let body = format!(
        "{}\n{}\n{}",
        claims_table(&claims),
        attributes_table(&claims),
        SIGN_OUT_FORM
    );
    page("Secure", &body).into_response()
}

async fn error_page() -> (StatusCode, Html<String>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        page("Error", "<p>An error occurred while processing your request.</p>"),
    )
}

const SIGN_OUT_FORM: &str =
    "<form method=\"post\" action=\"/Account/SignOut\"><button type=\"submit\">Sign out</button></form>";

fn claims_table(claims: &Claims) -> String {
    let mut rows = vec![
        ("NameID", Some(claims.sub.as_str())),
        ("NameID format", claims.name_id_format.as_deref()),
        ("Identity provider", Some(claims.idp.as_str())),
        ("Session index", claims.session_index.as_deref()),
    ];
    rows.retain(|(_, value)| value.is_some());

    let rows: String = rows
        .into_iter()
        .map(|(name, value)| {
            format!(
                "<tr><th>{}</th><td>{}</td></tr>",
                name,
                escape_html(value.unwrap_or_default())
            )
        })
        .collect();

    format!("<table>{}</table>", rows)
}

fn attributes_table(claims: &Claims) -> String {
    if claims.attributes.is_empty() {
        return "<p>The identity provider sent no attributes.</p>".to_string();
    }

    let rows: String = claims
        .attributes
        .iter()
        .map(|(name, values)| {
            let values: Vec<String> = values.iter().map(|v| escape_html(v)).collect();
            format!(
                "<tr><th>{}</th><td>{}</td></tr>",
                escape_html(name),
                values.join("<br>")
            )
        })
        .collect();

    format!("<h2>Attributes</h2>\n<table>{}</table>", rows)
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{} - IdP-initiated SP</title>\n<link rel=\"stylesheet\" href=\"/site.css\">\n</head>\n<body>\n<h1>{}</h1>\n{}\n</body>\n</html>\n",
        title, title, body
    ))
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
