use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::AppError;
use crate::AppState;
use super::jwt::Claims;

/// Signed-in user, taken from the session cookie
#[derive(Debug, Clone)]
pub struct SessionUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_cookie_value(&parts.headers, &state.config.session.cookie_name)
            .ok_or_else(|| AppError::Unauthorized("Not signed in".to_string()))?;

        let token_data = state.sessions.verify(token)?;

        Ok(SessionUser(token_data.claims))
    }
}

/// Optional authentication - returns None if no valid session instead of error
#[derive(Debug, Clone)]
pub struct OptionalSessionUser(pub Option<Claims>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalSessionUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = SessionUser::from_request_parts(parts, state).await.ok();
        Ok(OptionalSessionUser(user.map(|SessionUser(claims)| claims)))
    }
}

/// Find a cookie by name across all Cookie headers.
pub fn session_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(name: &str, token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Lax",
        name, token, max_age_secs
    )
}

pub fn expired_session_cookie(name: &str) -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=Lax", name)
}
