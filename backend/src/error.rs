//! Standardized error handling for the service provider
//!
//! Every handler error is rendered as the same JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code (e.g., "SAML_ERROR", "PROVIDER_NOT_FOUND", "UNAUTHORIZED")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum AppError {
    // Authentication errors
    Unauthorized(String),
    TokenExpired,

    // Request errors
    BadRequest(String),

    // SAML errors
    SamlError(String),
    ProviderNotFound(String),
    UnsolicitedResponse(String),

    // Server errors
    InternalError(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::SamlError(_) | Self::ProviderNotFound(_) | Self::UnsolicitedResponse(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::SamlError(_) => "SAML_ERROR",
            Self::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            Self::UnsolicitedResponse(_) => "UNSOLICITED_RESPONSE",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized(msg) => msg.clone(),
            Self::TokenExpired => "Session has expired".to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::SamlError(msg) => {
                tracing::warn!("SAML error: {}", msg);
                "The SAML message could not be processed".to_string()
            }
            Self::ProviderNotFound(entity_id) => {
                format!("Identity provider '{}' is not configured", entity_id)
            }
            Self::UnsolicitedResponse(entity_id) => format!(
                "Identity provider '{}' is not allowed to send unsolicited responses",
                entity_id
            ),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.error_code(), self)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = ApiError::new(self.error_code(), self.message());

        (status, Json(error)).into_response()
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::Unauthorized(format!("Invalid session: {}", err)),
        }
    }
}

impl From<samael::service_provider::Error> for AppError {
    fn from(err: samael::service_provider::Error) -> Self {
        Self::SamlError(err.to_string())
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, AppError>;
