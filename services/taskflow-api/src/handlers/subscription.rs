//! Subscription handlers

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use taskflow_axum::RequireAuth;
use taskflow_billing_core::PlanChange;
use taskflow_types::{PaymentIntent, Plan, ResourceStatus, Subscription};

use super::shared::{parse_cycle, parse_tier, record_op_duration};
use crate::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Subscription,
    pub plan: Plan,
    pub usage: BTreeMap<&'static str, ResourceStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub tier: Option<String>,
    pub billing_cycle: Option<String>,
}

/// Intent details the browser needs to finish a payment
#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}

impl From<PaymentIntent> for PaymentIntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            id: intent.id,
            client_secret: intent.client_secret,
            amount_cents: intent.amount_cents,
            currency: intent.currency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChangePlanResponse {
    pub subscription: Subscription,
    pub requires_payment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<PaymentIntentResponse>,
}

#[derive(Debug, Serialize)]
pub struct CanceledResponse {
    pub subscription: Subscription,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub usage: BTreeMap<&'static str, ResourceStatus>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/subscription
///
/// Current plan and usage; users without a subscription are put on free.
pub async fn get_subscription(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
) -> ApiResult<Json<SubscriptionResponse>> {
    let start = Instant::now();

    let result = state.billing.ensure_default_subscription(&auth.user_id).await;
    record_op_duration("get_subscription", start, result.is_ok());
    let subscription = result?;

    let plan = state.gates.checker().effective_plan(&auth.user_id).await;
    let usage = state.gates.get_rate_limit_status(&auth.user_id).await;

    Ok(Json(SubscriptionResponse {
        subscription,
        plan,
        usage,
    }))
}

/// POST /api/subscription
pub async fn change_subscription(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<ChangePlanRequest>,
) -> ApiResult<Json<ChangePlanResponse>> {
    let tier = parse_tier(req.tier)?;
    let cycle = match req.billing_cycle {
        Some(_) => parse_cycle(req.billing_cycle)?,
        None => Default::default(),
    };

    let start = Instant::now();
    let result = state.billing.change_plan(&auth.user_id, tier, cycle).await;
    record_op_duration("change_plan", start, result.is_ok());

    let response = match result? {
        PlanChange::Downgraded(subscription) => ChangePlanResponse {
            subscription,
            requires_payment: false,
            payment_intent: None,
        },
        PlanChange::PaymentRequired(created) => ChangePlanResponse {
            subscription: created.subscription,
            requires_payment: true,
            payment_intent: Some(created.payment_intent.into()),
        },
    };

    Ok(Json(response))
}

/// DELETE /api/subscription
pub async fn cancel_subscription(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
) -> ApiResult<Json<CanceledResponse>> {
    let start = Instant::now();

    let result = state.billing.cancel_subscription(&auth.user_id).await;
    record_op_duration("cancel_subscription", start, result.is_ok());

    let subscription = result?;
    Ok(Json(CanceledResponse { subscription }))
}

/// GET /api/subscription/usage
pub async fn get_usage(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
) -> Json<UsageResponse> {
    Json(UsageResponse {
        usage: state.gates.get_rate_limit_status(&auth.user_id).await,
    })
}
