// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// API errors that can occur during request processing
#[derive(Error, Debug)]
pub enum ApiError {
    /// OAuth callback arrived without a `code` query parameter
    #[error("Missing OAuth authorization code. Please try logging in again.")]
    MissingAuthorizationCode,

    /// OAuth callback carried a `state` we never issued, or one that expired
    #[error("Invalid or expired OAuth state. Please try logging in again.")]
    InvalidState,

    /// Provider redirected back with `error=...` instead of a code
    #[error("Authorization denied by provider: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    /// Token endpoint answered the code exchange with a non-2xx status
    #[error("Token exchange failed: {status} - {body}")]
    TokenExchangeFailed { status: u16, body: String },

    /// No token has been stored yet
    #[error("User not authenticated. Please login first.")]
    Unauthenticated,

    /// Token endpoint rejected the refresh request
    #[error("Token expired, please re-authenticate.")]
    TokenExpiredUnrefreshable { details: String },

    /// Non-2xx response from a provider API call
    #[error("{action}: {status} - {body}")]
    ProviderRequestFailed {
        action: String,
        status: u16,
        body: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Build a `ProviderRequestFailed` for the given action
    pub fn provider(action: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        ApiError::ProviderRequestFailed {
            action: action.into(),
            status,
            body: body.into(),
        }
    }
}

/// Extractor rejections become validation errors so callers always get a JSON body
macro_rules! rejection_into_validation_error {
    ($($rejection:ty),+ $(,)?) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    ApiError::ValidationError(rejection.body_text())
                }
            }
        )+
    };
}

rejection_into_validation_error!(
    BytesRejection,
    JsonRejection,
    MultipartRejection,
    PathRejection,
    QueryRejection,
);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details): (StatusCode, String, Value) = match self {
            ApiError::MissingAuthorizationCode | ApiError::InvalidState => {
                (StatusCode::BAD_REQUEST, self.to_string(), Value::Null)
            }
            ApiError::AuthorizationDenied {
                ref description, ..
            } => {
                let details = description.clone().map(Value::String).unwrap_or(Value::Null);
                (StatusCode::BAD_REQUEST, self.to_string(), details)
            }
            ApiError::TokenExchangeFailed { body, .. } => (
                StatusCode::BAD_GATEWAY,
                "Failed to authenticate".to_string(),
                Value::String(body),
            ),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string(), Value::Null),
            ApiError::TokenExpiredUnrefreshable { ref details } => {
                let details = Value::String(details.clone());
                (StatusCode::UNAUTHORIZED, self.to_string(), details)
            }
            ApiError::ProviderRequestFailed {
                action,
                status,
                body,
            } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status_code, action, Value::String(body))
            }
            ApiError::ConfigError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Value::String(msg),
            ),
            ApiError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                "Validation error".to_string(),
                Value::String(msg),
            ),
            ApiError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Value::Null,
                )
            }
        };

        let body = Json(json!({
            "error": error,
            "details": details,
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
