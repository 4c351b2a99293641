//! TaskFlow API
//!
//! Subscription, payment and entitlement endpoints, plus the task actions
//! they gate.
//!
//! ## REST Endpoints
//!
//! - `GET|POST|DELETE /api/subscription` - Current plan, change plan, cancel
//! - `GET /api/subscription/usage` - Usage against plan limits
//! - `POST /api/payments/create-subscription` - Start a paid subscription
//! - `POST /api/payments/confirm` - Apply a payment intent's outcome
//! - `GET|POST|DELETE /api/payments/methods` - Saved payment methods
//! - `POST /api/payments/webhook`, `POST /api/stripe/webhook` - Provider callbacks
//! - `POST /api/tasks` - Create a task (monthly task quota)
//! - `POST /api/tasks/auto-archive` - Archive old completed tasks
//! - `POST /api/ai/decompose` - AI task breakdown (feature flag + AI quota)
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

pub mod ai;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use taskflow_axum::{enforce_quota, throttle_requests, AuthLayer, GateConfig, QuotaGate};
use taskflow_types::ResourceType;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::{health, ready};
pub use crate::state::AppState;

/// Build the HTTP router
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    // Task creation consumes the monthly task quota
    let task_gate = QuotaGate::new(
        state.gates.clone(),
        GateConfig::resource(ResourceType::Tasks),
    );
    let gated_routes = Router::new()
        .route("/api/tasks", post(handlers::create_task))
        .route_layer(middleware::from_fn_with_state(task_gate, enforce_quota));

    // Authenticated API routes, throttled per caller
    let api_routes = Router::new()
        // Subscription routes
        .route(
            "/api/subscription",
            get(handlers::get_subscription)
                .post(handlers::change_subscription)
                .delete(handlers::cancel_subscription),
        )
        .route("/api/subscription/usage", get(handlers::get_usage))
        // Payment routes
        .route(
            "/api/payments/create-subscription",
            post(handlers::create_subscription),
        )
        .route("/api/payments/confirm", post(handlers::confirm_payment))
        .route(
            "/api/payments/methods",
            get(handlers::list_payment_methods)
                .post(handlers::add_payment_method)
                .delete(handlers::remove_payment_method),
        )
        // Task routes
        .route("/api/tasks/auto-archive", post(handlers::auto_archive))
        .route("/api/ai/decompose", post(handlers::decompose_task))
        .merge(gated_routes)
        .layer(middleware::from_fn_with_state(
            state.throttle.clone(),
            throttle_requests,
        ))
        .layer(AuthLayer::new(state.validator.clone()));

    // Webhook routes (raw body, signature instead of session)
    let webhook_routes = Router::new()
        .route("/api/payments/webhook", post(handlers::payment_webhook))
        .route("/api/stripe/webhook", post(handlers::payment_webhook));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics route (no timeout)
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let service_layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .merge(api_routes)
        .merge(webhook_routes)
        .layer(service_layers)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}
