//! Payment handlers: checkout, confirmation and saved payment methods

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskflow_axum::RequireAuth;
use taskflow_billing_core::AddPaymentMethod;
use taskflow_types::{PaymentMethod, PaymentMethodId, Subscription, TransactionStatus};
use uuid::Uuid;

use super::shared::{
    parse_cycle, parse_tier, record_op_duration, require_field, validate_string_length,
    MAX_TOKEN_LEN,
};
use super::subscription::PaymentIntentResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub tier: Option<String>,
    pub billing_cycle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSubscriptionResponse {
    pub subscription_id: String,
    pub payment_intent: PaymentIntentResponse,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    pub status: TransactionStatus,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Deserialize)]
pub struct AddPaymentMethodRequest {
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub set_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct RemovePaymentMethodQuery {
    pub id: Option<String>,
}

/// Saved method as shown to its owner; the provider token stays server-side
#[derive(Debug, Serialize)]
pub struct PaymentMethodResponse {
    pub id: PaymentMethodId,
    pub provider: String,
    pub brand: Option<String>,
    pub last_four: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentMethod> for PaymentMethodResponse {
    fn from(m: PaymentMethod) -> Self {
        Self {
            id: m.id,
            provider: m.provider,
            brand: m.brand,
            last_four: m.last_four,
            exp_month: m.exp_month,
            exp_year: m.exp_year,
            is_default: m.is_default,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentMethodsResponse {
    pub payment_methods: Vec<PaymentMethodResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/payments/create-subscription
pub async fn create_subscription(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<CreateSubscriptionRequest>,
) -> ApiResult<Json<CreateSubscriptionResponse>> {
    let tier = parse_tier(req.tier)?;
    let cycle = parse_cycle(req.billing_cycle)?;

    let start = Instant::now();
    let result = state
        .billing
        .create_subscription(&auth.user_id, tier, cycle)
        .await;
    record_op_duration("create_subscription", start, result.is_ok());
    let created = result?;

    Ok(Json(CreateSubscriptionResponse {
        subscription_id: created.subscription.id.to_string(),
        payment_intent: created.payment_intent.into(),
    }))
}

/// POST /api/payments/confirm
///
/// Safe to repeat: a completed intent stays completed.
pub async fn confirm_payment(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<ConfirmPaymentRequest>,
) -> ApiResult<Json<ConfirmPaymentResponse>> {
    let intent_id = require_field(req.payment_intent_id, "payment_intent_id")?;
    validate_string_length(&intent_id, "payment_intent_id", MAX_TOKEN_LEN)?;

    let start = Instant::now();
    let result = state.billing.confirm_payment(&auth.user_id, &intent_id).await;
    record_op_duration("confirm_payment", start, result.is_ok());
    let outcome = result?;

    Ok(Json(ConfirmPaymentResponse {
        status: outcome.transaction_status,
        subscription: outcome.subscription,
    }))
}

/// GET /api/payments/methods
pub async fn list_payment_methods(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
) -> ApiResult<Json<PaymentMethodsResponse>> {
    let methods = state.billing.list_payment_methods(&auth.user_id).await?;
    Ok(Json(PaymentMethodsResponse {
        payment_methods: methods.into_iter().map(Into::into).collect(),
    }))
}

/// POST /api/payments/methods
pub async fn add_payment_method(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<AddPaymentMethodRequest>,
) -> ApiResult<(StatusCode, Json<PaymentMethodResponse>)> {
    let token = require_field(req.payment_method_id, "payment_method_id")?;
    validate_string_length(&token, "payment_method_id", MAX_TOKEN_LEN)?;

    let start = Instant::now();
    let result = state
        .billing
        .add_payment_method(
            &auth.user_id,
            AddPaymentMethod {
                token,
                set_default: req.set_default,
            },
        )
        .await;
    record_op_duration("add_payment_method", start, result.is_ok());

    Ok((StatusCode::CREATED, Json(result?.into())))
}

/// DELETE /api/payments/methods?id=
pub async fn remove_payment_method(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Query(query): Query<RemovePaymentMethodQuery>,
) -> ApiResult<StatusCode> {
    let raw = require_field(query.id, "id")?;
    let method_id = Uuid::parse_str(&raw)
        .map(PaymentMethodId)
        .map_err(|_| ApiError::BadRequest("Invalid payment method id".into()))?;

    state
        .billing
        .remove_payment_method(&auth.user_id, method_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
