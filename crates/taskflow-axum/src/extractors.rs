//! Request extractors over the context installed by [`AuthLayer`](crate::AuthLayer).
//!
//! Billing and task routes take [`RequireAuth`]; quota checks that must also
//! answer anonymous callers take [`MaybeAuth`].
//!
//! ```ignore
//! async fn usage(State(gates): State<RateLimitMiddleware>, auth: RequireAuth) -> Json<Value> {
//!     Json(json!({ "usage": gates.get_rate_limit_status(&auth.user_id).await }))
//! }
//! ```

use std::ops::Deref;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::context::AuthContext;
use crate::error::AuthError;

/// Extension key for storing auth context in request extensions.
#[derive(Debug, Clone)]
pub struct AuthContextExt(pub AuthContext);

/// Extractor that requires authentication.
///
/// Returns 401 Unauthorized if no valid authentication is present.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContextExt>()
            .cloned()
            .map(|ext| Self(ext.0))
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Extractor for optional authentication.
///
/// Returns `None` if no authentication is present, rather than failing.
#[derive(Debug, Clone)]
pub struct MaybeAuth(pub Option<AuthContext>);

impl Deref for MaybeAuth {
    type Target = Option<AuthContext>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<AuthContextExt>()
            .cloned()
            .map(|ext| ext.0);
        Ok(Self(auth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use taskflow_types::UserId;

    fn parts_with(ctx: Option<AuthContext>) -> Parts {
        let mut request = Request::builder().uri("/").body(()).unwrap();
        if let Some(ctx) = ctx {
            request.extensions_mut().insert(AuthContextExt(ctx));
        }
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_require_auth_rejects_anonymous() {
        let mut parts = parts_with(None);
        let result = RequireAuth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_require_auth_reads_context() {
        let user_id = UserId::new();
        let mut parts = parts_with(Some(AuthContext::new(user_id)));
        let auth = RequireAuth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(auth.user_id, user_id);
    }

    #[tokio::test]
    async fn test_maybe_auth() {
        let mut parts = parts_with(None);
        let auth = MaybeAuth::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(auth.is_none());
    }
}
