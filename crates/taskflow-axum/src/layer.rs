//! Tower middleware layer for session authentication.
//!
//! [`AuthLayer`] reads `Authorization: Bearer <token>`, validates it and
//! stores the resulting [`AuthContext`] in request extensions. Requests
//! without a valid token pass through unauthenticated; handlers decide
//! whether that is acceptable via [`crate::RequireAuth`] or
//! [`crate::MaybeAuth`].

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap, Request};
use tower::{Layer, Service};
use tracing::debug;

use crate::extractors::AuthContextExt;
use crate::token::TokenValidator;

/// Tower layer that authenticates requests.
#[derive(Clone)]
pub struct AuthLayer {
    validator: Arc<TokenValidator>,
}

impl AuthLayer {
    /// Create a new auth layer with the given validator.
    #[must_use]
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            validator: self.validator.clone(),
        }
    }
}

/// The authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    validator: Arc<TokenValidator>,
}

impl<S, B> Service<Request<B>> for AuthService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let validated = bearer_token(req.headers()).map(|token| self.validator.validate(token));

        match validated {
            Some(Ok(ctx)) => {
                req.extensions_mut().insert(AuthContextExt(ctx));
            }
            Some(Err(e)) => debug!(error = %e, "Rejected bearer token"),
            None => {}
        }

        self.inner.call(req)
    }
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
