use axum::{
    extract::{Query, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use idp_initiated_shared::RejectionReason;

use crate::error::{ApiResult, AppError};
use crate::AppState;
use super::middleware::session_cookie;
use super::pending::PendingRequest;
use super::return_url::{select_return_location, AcsRequestContext};
use super::saml::{decode_saml_response, generate_sp_metadata, peek_issuer, SamlIdentity};

pub fn saml_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/Saml2", get(sp_metadata))
        .route("/Saml2/SignIn", get(sign_in))
        .route("/Saml2/Acs", post(acs))
}

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(default)]
    pub idp: Option<String>,
    #[serde(default, rename = "ReturnUrl")]
    pub return_url: Option<String>,
}

/// Return SP metadata XML
async fn sp_metadata(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/samlmetadata+xml")],
        generate_sp_metadata(&state.config.sp),
    )
}

/// SP-initiated sign-in: send the browser to the IdP with an AuthnRequest.
async fn sign_in(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SignInQuery>,
) -> ApiResult<Response> {
    let idp = match query.idp.as_deref().filter(|idp| !idp.is_empty()) {
        Some(entity_id) => state
            .providers
            .get(entity_id)
            .ok_or_else(|| AppError::ProviderNotFound(entity_id.to_string()))?,
        None => state
            .providers
            .default_provider()
            .ok_or_else(|| AppError::InternalError("No identity providers configured".to_string()))?,
    };

    let return_url = match state.resolver.resolve(query.return_url.as_deref()) {
        Ok(target) => Some(target),
        Err(RejectionReason::Absent) => None,
        Err(reason) => {
            tracing::warn!(
                reason = reason.as_str(),
                candidate = ?query.return_url,
                "Ignoring unsafe ReturnUrl"
            );
            None
        }
    };

    let sso_url = idp.sso_location().ok_or_else(|| {
        AppError::SamlError(format!(
            "Identity provider {} has no HTTP-Redirect SSO endpoint",
            idp.entity_id()
        ))
    })?;

    let authn_request = idp
        .service_provider
        .make_authentication_request(&sso_url)
        .map_err(|e| AppError::SamlError(format!("Failed to build AuthnRequest: {}", e)))?;

    let relay_state = state
        .pending
        .insert(PendingRequest::new(
            authn_request.id.clone(),
            idp.entity_id(),
            return_url,
        ))
        .await;

    let redirect_url = authn_request
        .redirect(&relay_state)
        .map_err(|e| AppError::SamlError(format!("Failed to encode AuthnRequest: {}", e)))?
        .ok_or_else(|| AppError::SamlError("AuthnRequest has no destination".to_string()))?;

    tracing::info!(
        idp = %idp.entity_id(),
        request_id = %authn_request.id,
        "Redirecting to identity provider"
    );

    Ok(Redirect::to(redirect_url.as_str()).into_response())
}

/// Assertion consumer service (HTTP-POST binding).
async fn acs(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    Form(form): Form<HashMap<String, String>>,
) -> ApiResult<Response> {
    let saml_response = form
        .get("SAMLResponse")
        .ok_or_else(|| AppError::BadRequest("Missing SAMLResponse".to_string()))?;
    let relay_state = form
        .get("RelayState")
        .map(String::as_str)
        .filter(|relay_state| !relay_state.is_empty());
    let target = single_query_value(query.as_deref(), "target");

    let xml = decode_saml_response(saml_response)?;
    let issuer = peek_issuer(&xml)?;
    let idp = state
        .providers
        .get(&issuer)
        .ok_or_else(|| AppError::ProviderNotFound(issuer.clone()))?;

    // Consumed only once the response has been accepted
    let pending = match relay_state {
        Some(key) => state.pending.get(key).await,
        None => None,
    };
    let pending = match pending {
        Some(pending) if pending.idp_entity_id != idp.entity_id() => {
            tracing::warn!(
                expected = %pending.idp_entity_id,
                issuer = %idp.entity_id(),
                "Response issuer does not match the pending AuthnRequest"
            );
            None
        }
        other => other,
    };

    if pending.is_none() && !idp.config.allow_unsolicited_authn_response {
        return Err(AppError::UnsolicitedResponse(idp.entity_id().to_string()));
    }

    let request_ids: Vec<&str> = pending.iter().map(|p| p.request_id.as_str()).collect();
    let possible_request_ids = if request_ids.is_empty() {
        None
    } else {
        Some(request_ids.as_slice())
    };
    let assertion = idp
        .service_provider
        .parse_xml_response(&xml, possible_request_ids)?;

    if let (Some(key), Some(_)) = (relay_state, &pending) {
        if state.pending.take(key).await.is_none() {
            return Err(AppError::BadRequest(
                "The AuthnRequest was already answered".to_string(),
            ));
        }
    }

    let identity = SamlIdentity::from_assertion(&assertion)?;
    let session = state
        .sessions
        .issue(&identity, idp.entity_id())
        .map_err(|e| AppError::InternalError(format!("Failed to issue session token: {}", e)))?;

    let ctx = AcsRequestContext {
        target: target.as_deref(),
        relay_state,
        pending_return_url: pending.as_ref().and_then(|p| p.return_url.as_ref()),
    };
    let selected = select_return_location(
        &state.resolver,
        &state.config.sp.return_url,
        &idp.config,
        &ctx,
    );

    tracing::info!(
        idp = %idp.entity_id(),
        name_id = %identity.name_id,
        unsolicited = pending.is_none(),
        source = ?selected.source,
        location = %selected.location,
        "SAML sign-in completed"
    );

    let cookie = session_cookie(
        &state.config.session.cookie_name,
        &session.token,
        state.sessions.lifetime_secs(),
    );

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, selected.location.into_string()),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response())
}

/// Value of a query parameter that appears exactly once.
fn single_query_value(query: Option<&str>, name: &str) -> Option<String> {
    let mut values = url::form_urlencoded::parse(query?.as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned());

    let first = values.next()?;
    if values.next().is_some() {
        tracing::warn!("Ignoring repeated '{}' query parameter", name);
        return None;
    }
    Some(first)
}
