pub mod jwt;
pub mod middleware;
pub mod pending;
pub mod providers;
pub mod return_url;
pub mod saml;
pub mod saml_handlers;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::sync::Arc;

use crate::AppState;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(saml_handlers::saml_routes())
        .route("/Account/SignOut", post(sign_out))
}

/// Clear the local session. The IdP session is left alone.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    middleware::OptionalSessionUser(user): middleware::OptionalSessionUser,
) -> Response {
    if let Some(claims) = user {
        tracing::info!(name_id = %claims.sub, idp = %claims.idp, "Signed out");
    }

    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                middleware::expired_session_cookie(&state.config.session.cookie_name),
            ),
        ],
    )
        .into_response()
}
