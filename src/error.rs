/// Unified error types for Agora
use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Field name -> list of messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Main error type for the API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed input, with field-level messages where known
    #[error("{message}")]
    Validation { message: String, fields: FieldErrors },

    /// Missing, expired or malformed bearer token
    #[error("Authentication credentials were not provided or are invalid")]
    Unauthenticated,

    /// Login with bad credentials or an inactive account
    #[error("{0}")]
    InvalidCredentials(String),

    /// Refresh token that is expired, malformed, unknown or already rotated
    #[error("Token is invalid or expired")]
    InvalidToken,

    /// Authenticated but not permitted
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    /// Social provider refused the token or returned unusable claims
    #[error("{0}")]
    ProviderRejected(String),

    /// Social provider could not be reached
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Duplicate email on registration
    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Validation error without field detail
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    /// Validation error attached to a single field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.clone()]);
        ApiError::Validation { message, fields }
    }

    /// Stable error kind reported to clients
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "ValidationError",
            ApiError::Unauthenticated => "Unauthenticated",
            ApiError::InvalidCredentials(_) => "InvalidCredentials",
            ApiError::InvalidToken => "InvalidToken",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::RateLimited { .. } => "RateLimited",
            ApiError::ProviderRejected(_) => "ProviderRejected",
            ApiError::ProviderUnavailable(_) => "ProviderUnavailable",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Database(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                "InternalServerError"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated
            | ApiError::InvalidCredentials(_)
            | ApiError::InvalidToken
            | ApiError::ProviderRejected(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Wire format for every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: FieldErrors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            ApiError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal server error".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let (fields, retry_after) = match self {
            ApiError::Validation { fields, .. } => (fields, None),
            ApiError::RateLimited { retry_after } => {
                (FieldErrors::new(), Some(retry_after.as_secs().max(1)))
            }
            _ => (FieldErrors::new(), None),
        };

        let body = Json(ErrorResponse {
            error: kind.to_string(),
            message,
            fields,
            retry_after,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", e.code))
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }
        ApiError::Validation {
            message: "Invalid request data".to_string(),
            fields,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::invalid(format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::invalid(rejection.body_text())
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
