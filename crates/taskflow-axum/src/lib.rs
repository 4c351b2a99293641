//! TaskFlow Axum Integration
//!
//! Axum middleware and extractors that sit between HTTP handlers and the
//! entitlement layer.
//!
//! # Overview
//!
//! - **Auth**: [`AuthLayer`] validates bearer session tokens and attaches an
//!   [`AuthContext`]; [`RequireAuth`] and [`MaybeAuth`] read it back.
//! - **Quota gates**: [`RateLimitMiddleware`] runs the check → act → track
//!   sequence around metered actions, either called directly from handlers
//!   or wrapped around a route with [`enforce_quota`].
//! - **Throttling**: [`RequestThrottle`] applies per-tier token buckets,
//!   independent of monthly quotas.
//!
//! # Quick Start
//!
//! ```ignore
//! use axum::{middleware, routing::post, Router};
//! use taskflow_axum::{enforce_quota, AuthLayer, GateConfig, QuotaGate, RequireAuth};
//! use taskflow_types::ResourceType;
//!
//! let tasks = Router::new()
//!     .route("/api/tasks", post(create_task))
//!     .route_layer(middleware::from_fn_with_state(
//!         QuotaGate::new(gates.clone(), GateConfig::resource(ResourceType::Tasks)),
//!         enforce_quota,
//!     ));
//!
//! let app = Router::new().merge(tasks).layer(AuthLayer::new(validator));
//! ```

pub mod context;
pub mod error;
pub mod extractors;
pub mod layer;
pub mod rate_limit;
pub mod throttle;
pub mod token;

pub use context::AuthContext;
pub use error::AuthError;
pub use extractors::{AuthContextExt, MaybeAuth, RequireAuth};
pub use layer::{AuthLayer, AuthService};
pub use rate_limit::{enforce_quota, Denial, GateConfig, QuotaGate, RateLimitMiddleware};
pub use throttle::{throttle_requests, RequestThrottle, ThrottleKey};
pub use token::{SessionClaims, TokenValidator, SESSION_AUDIENCE};
