//! Error types for auth middleware and extractors.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use taskflow_types::{DenialBody, DenialCode};

/// Authentication and throttling errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authentication credentials provided.
    #[error("authentication required")]
    Unauthenticated,

    /// Token failed signature, audience or claim checks.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token was valid once but has expired.
    #[error("token expired")]
    TokenExpired,

    /// Request throttle tripped.
    #[error("rate limit exceeded: retry after {retry_after_secs} seconds")]
    RateLimitExceeded { retry_after_secs: u64 },
}

impl AuthError {
    /// Create a rate limit exceeded error.
    #[must_use]
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimitExceeded { retry_after_secs }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            // Token problems are not distinguished to the caller.
            Self::Unauthenticated | Self::InvalidToken(_) | Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                Json(DenialBody::message("Unauthorized")),
            )
                .into_response(),
            Self::RateLimitExceeded { retry_after_secs } => {
                let body = DenialBody {
                    code: Some(DenialCode::RateLimitExceeded),
                    ..DenialBody::message("Too many requests")
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs.max(1)));
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::Unauthenticated;
        assert_eq!(err.to_string(), "authentication required");

        let err = AuthError::rate_limited(60);
        assert!(err.to_string().contains("60 seconds"));
    }

    #[test]
    fn test_token_errors_are_401() {
        for err in [
            AuthError::Unauthenticated,
            AuthError::InvalidToken("bad signature".into()),
            AuthError::TokenExpired,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AuthError::rate_limited(0).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
