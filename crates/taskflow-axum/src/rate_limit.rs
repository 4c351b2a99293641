//! Quota gates for metered actions.
//!
//! Every metered action follows the same sequence:
//!
//! ```text
//! REQUESTED -> DENIED(reason)
//!           -> ALLOWED -> action runs -> USAGE_TRACKED
//! ```
//!
//! [`RateLimitMiddleware::check_rate_limit`] makes the decision and
//! [`RateLimitMiddleware::track_usage`] records the action afterwards. The
//! two steps are separate store operations, so concurrent requests at the
//! edge of a quota can overshoot it by the number of requests in flight.
//! Routes that must never overshoot use [`RateLimitMiddleware::reserve`],
//! which checks and consumes in one store operation.

use std::collections::BTreeMap;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use taskflow_entitlement::{Consumption, EntitlementChecker};
use taskflow_types::{
    DenialBody, DenialCode, Feature, Limit, ResourceStatus, ResourceType, UserId,
};

use crate::context::AuthContext;
use crate::extractors::AuthContextExt;

/// What a gated action consumes and which feature it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub resource: ResourceType,
    pub feature: Option<Feature>,
}

impl GateConfig {
    /// Gate on a resource quota only
    pub const fn resource(resource: ResourceType) -> Self {
        Self {
            resource,
            feature: None,
        }
    }

    /// Also require a plan feature flag
    #[must_use]
    pub const fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }
}

/// A refused gated action, rendered as the denial JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    status: StatusCode,
    body: DenialBody,
}

impl Denial {
    /// No authenticated caller
    pub fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: DenialBody::message("Unauthorized"),
        }
    }

    /// The caller's plan lacks `feature`
    pub fn feature_not_available(feature: Feature) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: DenialBody {
                code: Some(DenialCode::FeatureNotAvailable),
                upgrade_required: Some(true),
                ..DenialBody::message(format!(
                    "{} is not available on your current plan",
                    feature.as_str()
                ))
            },
        }
    }

    /// The monthly counter for `resource` is exhausted
    pub fn limit_exceeded(resource: ResourceType, used: f64, limit: Limit) -> Self {
        let usage = BTreeMap::from([(resource.usage_key().to_string(), usage_value(resource, used))]);
        let limits = BTreeMap::from([(resource.limit_key().to_string(), json!(limit.raw()))]);

        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: DenialBody {
                code: Some(DenialCode::RateLimitExceeded),
                usage: Some(usage),
                limits: Some(limits),
                upgrade_required: Some(true),
                ..DenialBody::message(format!(
                    "Monthly {} limit reached",
                    resource.as_str().replace('_', " ")
                ))
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> Option<DenialCode> {
        self.body.code
    }

    pub fn body(&self) -> &DenialBody {
        &self.body
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Counters are whole numbers; storage is fractional megabytes.
fn usage_value(resource: ResourceType, used: f64) -> Value {
    if resource.is_storage() {
        json!(used)
    } else {
        json!(used.max(0.0).round() as u64)
    }
}

fn record_denial(denial: &Denial, resource: ResourceType) {
    let code = match denial.code() {
        Some(DenialCode::FeatureNotAvailable) => "feature_not_available",
        Some(DenialCode::RateLimitExceeded) => "rate_limit_exceeded",
        None => "unauthenticated",
    };
    metrics::counter!(
        "taskflow_denials_total",
        "code" => code,
        "resource" => resource.as_str()
    )
    .increment(1);
}

/// Check → act → track orchestration over the entitlement checker
#[derive(Clone)]
pub struct RateLimitMiddleware {
    checker: EntitlementChecker,
}

impl RateLimitMiddleware {
    pub fn new(checker: EntitlementChecker) -> Self {
        Self { checker }
    }

    pub fn checker(&self) -> &EntitlementChecker {
        &self.checker
    }

    /// Decide whether the caller may perform the gated action
    #[instrument(skip(self, auth), fields(resource = gate.resource.as_str()))]
    pub async fn check_rate_limit(
        &self,
        auth: Option<&AuthContext>,
        gate: GateConfig,
    ) -> Result<(), Denial> {
        let Some(auth) = auth else {
            let denial = Denial::unauthenticated();
            record_denial(&denial, gate.resource);
            return Err(denial);
        };

        if let Some(feature) = gate.feature {
            if !self.checker.can_use_feature(&auth.user_id, feature).await {
                debug!(user_id = %auth.user_id, feature = feature.as_str(), "Feature not on plan");
                let denial = Denial::feature_not_available(feature);
                record_denial(&denial, gate.resource);
                return Err(denial);
            }
        }

        let decision = self.checker.evaluate(&auth.user_id, gate.resource).await;
        if !decision.allowed {
            debug!(
                user_id = %auth.user_id,
                tier = %decision.tier,
                used = decision.used,
                "Quota exhausted"
            );
            let denial = Denial::limit_exceeded(gate.resource, decision.used, decision.limit);
            record_denial(&denial, gate.resource);
            return Err(denial);
        }

        Ok(())
    }

    /// Record a completed action.
    ///
    /// Failures are logged and dropped: the action already happened and is
    /// not undone for a bookkeeping error.
    pub async fn track_usage(
        &self,
        user_id: &UserId,
        resource: ResourceType,
        resource_id: Option<&str>,
        quantity: u64,
    ) {
        if let Err(e) = self
            .checker
            .ledger()
            .increment_usage(user_id, resource, quantity)
            .await
        {
            warn!(
                user_id = %user_id,
                resource = resource.as_str(),
                resource_id = resource_id.unwrap_or_default(),
                error = %e,
                "Usage tracking failed"
            );
        }
    }

    /// True if an upload of `file_size_bytes` fits the storage quota
    pub async fn check_storage_limit(&self, user_id: &UserId, file_size_bytes: u64) -> bool {
        self.checker
            .check_storage_limit(user_id, file_size_bytes)
            .await
    }

    /// Usage against limits for every tracked resource, keyed by resource name.
    ///
    /// Users without a subscription row, or whose usage cannot be read,
    /// get zeroed placeholders.
    pub async fn get_rate_limit_status(
        &self,
        user_id: &UserId,
    ) -> BTreeMap<&'static str, ResourceStatus> {
        let statuses = match self.checker.usage_status(user_id).await {
            Ok(Some(statuses)) => statuses,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Usage status unavailable");
                Vec::new()
            }
        };

        let mut out: BTreeMap<&'static str, ResourceStatus> = ResourceType::ALL
            .into_iter()
            .map(|r| (r.as_str(), ResourceStatus::placeholder()))
            .collect();
        for (resource, status) in statuses {
            out.insert(resource.as_str(), status);
        }
        out
    }

    /// Check and consume `quantity` units in one store operation
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn reserve(
        &self,
        user_id: &UserId,
        resource: ResourceType,
        quantity: u64,
    ) -> Result<f64, Denial> {
        let plan = self.checker.effective_plan(user_id).await;
        let limit = plan.limit(resource);

        match self
            .checker
            .ledger()
            .try_consume(user_id, resource, quantity, limit)
            .await
        {
            Ok(Consumption::Consumed { used }) => Ok(used),
            Ok(Consumption::Exhausted { used }) => {
                let denial = Denial::limit_exceeded(resource, used, limit);
                record_denial(&denial, resource);
                Err(denial)
            }
            Err(e) => {
                // Unreadable ledger: let the action through untracked.
                warn!(error = %e, resource = resource.as_str(), "Reservation failed, allowing");
                Ok(0.0)
            }
        }
    }
}

/// State for [`enforce_quota`]: the shared middleware plus one route's gate
#[derive(Clone)]
pub struct QuotaGate {
    pub middleware: RateLimitMiddleware,
    pub config: GateConfig,
}

impl QuotaGate {
    pub fn new(middleware: RateLimitMiddleware, config: GateConfig) -> Self {
        Self { middleware, config }
    }
}

/// Axum middleware running the gate before a route and tracking after it.
///
/// Usage is tracked only when the handler answers with a 2xx status.
pub async fn enforce_quota(State(gate): State<QuotaGate>, request: Request, next: Next) -> Response {
    let auth = request
        .extensions()
        .get::<AuthContextExt>()
        .map(|ext| ext.0.clone());

    if let Err(denial) = gate
        .middleware
        .check_rate_limit(auth.as_ref(), gate.config)
        .await
    {
        return denial.into_response();
    }

    let response = next.run(request).await;

    if let Some(auth) = auth {
        if response.status().is_success() {
            gate.middleware
                .track_usage(&auth.user_id, gate.config.resource, None, 1)
                .await;
        }
    }

    response
}
