//! Error types for the TaskFlow API service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use taskflow_axum::Denial;
use taskflow_billing_core::BillingError;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Entitlement refusal; rendered with the denial body
    #[error("Request denied")]
    Denied(Denial),

    /// Payment or AI provider failure; the message stays generic
    #[error("Upstream service error")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error")]
    Database(#[from] taskflow_db::DbError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Denied(denial) => denial.status(),
            Self::Upstream(_) | Self::Internal(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Denied(_) => "DENIED",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) | Self::Database(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<Denial> for ApiError {
    fn from(denial: Denial) -> Self {
        Self::Denied(denial)
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            e if e.is_not_found() => Self::NotFound(capitalize(&e.to_string())),
            e if e.is_bad_webhook() => Self::BadRequest(e.to_string()),
            BillingError::InvalidTier(tier) => {
                Self::BadRequest(format!("Tier cannot be purchased: {tier}"))
            }
            e @ BillingError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            BillingError::ProviderError(msg) => Self::Upstream(msg),
            BillingError::Database(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Denied(denial) => return denial.into_response(),
            other => other,
        };
        let status = err.status_code();
        let code = err.error_code();

        // Log server-side failures
        match &err {
            Self::Upstream(msg) => tracing::error!(error = %msg, "Upstream provider error"),
            Self::Internal(_) | Self::Database(_) => {
                tracing::error!(error = ?err, "Internal API error")
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: err.to_string(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
