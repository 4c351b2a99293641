//! Payment provider webhook handler

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use super::shared::record_op_duration;
use crate::state::AppState;

/// Header carrying `t=<unix>,v1=<hex>` signatures
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/payments/webhook, POST /api/stripe/webhook
///
/// Verifies the signature before touching any state. Bad signatures and
/// unparsable payloads answer 400 so the provider stops retrying them.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let start = Instant::now();

    let Some(sig_header) = headers.get(SIGNATURE_HEADER) else {
        tracing::warn!("Missing webhook signature header");
        metrics::counter!("taskflow_webhooks_processed_total", "status" => "rejected")
            .increment(1);
        return StatusCode::BAD_REQUEST;
    };

    let Ok(signature) = sig_header.to_str() else {
        tracing::warn!("Invalid webhook signature header encoding");
        metrics::counter!("taskflow_webhooks_processed_total", "status" => "rejected")
            .increment(1);
        return StatusCode::BAD_REQUEST;
    };

    let result = state.billing.process_webhook(&body, signature).await;
    record_op_duration("process_webhook", start, result.is_ok());

    match result {
        Ok(event_type) => {
            metrics::counter!(
                "taskflow_webhooks_processed_total",
                "status" => "success",
                "event" => event_type.label()
            )
            .increment(1);
            StatusCode::OK
        }
        Err(e) if e.is_bad_webhook() => {
            tracing::warn!(error = %e, "Webhook rejected");
            metrics::counter!("taskflow_webhooks_processed_total", "status" => "rejected")
                .increment(1);
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            tracing::error!(error = ?e, "Webhook processing failed");
            metrics::counter!("taskflow_webhooks_processed_total", "status" => "error")
                .increment(1);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
