//! Webhook verification and parsing
//!
//! Both providers sign deliveries the Stripe way: a `t=<unix>,v1=<hex>`
//! header where the MAC is HMAC-SHA256 over `"<t>.<payload>"`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::BillingError;
use crate::stripe::StripePaymentIntent;

/// Maximum age of a signed delivery
const TOLERANCE_SECS: i64 = 300;

/// Webhook event types we handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    PaymentIntentSucceeded,
    PaymentIntentFailed,
    InvoicePaid,
    InvoicePaymentFailed,
    SubscriptionDeleted,
    ChargeRefunded,
    DisputeCreated,
    /// Anything else; logged and acknowledged
    Unknown(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentFailed,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "charge.refunded" => Self::ChargeRefunded,
            "charge.dispute.created" => Self::DisputeCreated,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl WebhookEventType {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::PaymentIntentFailed => "payment_intent.payment_failed",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::ChargeRefunded => "charge.refunded",
            Self::DisputeCreated => "charge.dispute.created",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Parsed webhook event
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Provider event ID (logged, not stored)
    pub id: String,
    pub event_type: WebhookEventType,
    pub data: WebhookEventData,
    /// When the event was created (Unix timestamp)
    pub created: i64,
}

/// Webhook event data
#[derive(Debug, Clone)]
pub enum WebhookEventData {
    PaymentIntent(PaymentIntentData),
    Invoice(InvoiceData),
    Subscription(SubscriptionRef),
    Charge(ChargeData),
    /// Raw JSON for unknown events
    Raw(serde_json::Value),
}

/// Payment intent event data
#[derive(Debug, Clone)]
pub struct PaymentIntentData {
    pub intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    /// Our user ID, from intent metadata
    pub user_id: Option<Uuid>,
    /// Our subscription ID, from intent metadata
    pub subscription_id: Option<Uuid>,
    /// Provider subscription, present when the invoice is expanded
    pub provider_subscription_id: Option<String>,
}

/// Invoice event data
#[derive(Debug, Clone)]
pub struct InvoiceData {
    pub subscription: SubscriptionRef,
    /// Billing period the invoice covers
    pub period: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Pointer to a subscription, by provider ID or by our own ID in metadata
#[derive(Debug, Clone)]
pub struct SubscriptionRef {
    pub object_id: String,
    pub provider_subscription_id: Option<String>,
    pub subscription_id: Option<Uuid>,
}

/// Charge or dispute event data
#[derive(Debug, Clone)]
pub struct ChargeData {
    pub object_id: String,
    pub payment_intent_id: Option<String>,
}

/// Compute a signature header for `payload`
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> Result<String, BillingError> {
    let sig = signature_hex(secret, payload, timestamp)?;
    Ok(format!("t={timestamp},v1={sig}"))
}

fn signature_hex(secret: &str, payload: &[u8], timestamp: i64) -> Result<String, BillingError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Internal("HMAC error".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Webhook handler for verifying provider events
#[derive(Clone)]
pub struct WebhookHandler {
    webhook_secret: String,
}

impl WebhookHandler {
    /// Create a new webhook handler
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify and parse a webhook payload
    #[instrument(skip(self, payload, signature))]
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, BillingError> {
        self.verify_signature(payload, signature, Utc::now().timestamp())?;

        let raw_event: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::WebhookError(e.to_string()))?;

        debug!(event_id = %raw_event.id, event_type = %raw_event.event_type, "Parsed webhook event");

        let event_type = WebhookEventType::from(raw_event.event_type.as_str());
        let data = Self::parse_event_data(&event_type, raw_event.data.object)?;

        Ok(WebhookEvent {
            id: raw_event.id,
            event_type,
            data,
            created: raw_event.created,
        })
    }

    fn verify_signature(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> Result<(), BillingError> {
        // Parse signature header: t=timestamp,v1=signature
        let mut timestamp: Option<&str> = None;
        let mut sig_v1: Option<&str> = None;

        for part in signature.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => sig_v1 = Some(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            warn!("Missing timestamp in webhook signature");
            BillingError::SignatureInvalid("missing timestamp".to_string())
        })?;

        let sig_v1 = sig_v1.ok_or_else(|| {
            warn!("Missing v1 signature in webhook signature");
            BillingError::SignatureInvalid("missing signature".to_string())
        })?;

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| BillingError::SignatureInvalid("invalid timestamp".to_string()))?;

        let expected = signature_hex(&self.webhook_secret, payload, ts)?;

        if !bool::from(sig_v1.as_bytes().ct_eq(expected.as_bytes())) {
            warn!("Webhook signature verification failed");
            return Err(BillingError::SignatureInvalid(
                "signature mismatch".to_string(),
            ));
        }

        if (now - ts).abs() > TOLERANCE_SECS {
            warn!(timestamp = ts, now = now, "Webhook timestamp outside tolerance");
            return Err(BillingError::SignatureInvalid(
                "timestamp outside tolerance".to_string(),
            ));
        }

        Ok(())
    }

    fn parse_event_data(
        event_type: &WebhookEventType,
        object: serde_json::Value,
    ) -> Result<WebhookEventData, BillingError> {
        let parse_err = |e: serde_json::Error| BillingError::WebhookError(e.to_string());

        match event_type {
            WebhookEventType::PaymentIntentSucceeded | WebhookEventType::PaymentIntentFailed => {
                let intent: StripePaymentIntent = serde_json::from_value(object).map_err(parse_err)?;
                Ok(WebhookEventData::PaymentIntent(PaymentIntentData {
                    provider_subscription_id: intent.subscription_id().map(str::to_string),
                    user_id: metadata_uuid(&intent.metadata, "user_id"),
                    subscription_id: metadata_uuid(&intent.metadata, "subscription_id"),
                    intent_id: intent.id,
                    amount_cents: intent.amount,
                    currency: intent.currency,
                }))
            }
            WebhookEventType::InvoicePaid | WebhookEventType::InvoicePaymentFailed => {
                let invoice: RawInvoice = serde_json::from_value(object).map_err(parse_err)?;
                let period = invoice.line_period();
                Ok(WebhookEventData::Invoice(InvoiceData {
                    subscription: SubscriptionRef {
                        subscription_id: metadata_uuid(&invoice.metadata, "subscription_id"),
                        object_id: invoice.id,
                        provider_subscription_id: invoice.subscription,
                    },
                    period,
                }))
            }
            WebhookEventType::SubscriptionDeleted => {
                let sub: RawSubscription = serde_json::from_value(object).map_err(parse_err)?;
                Ok(WebhookEventData::Subscription(SubscriptionRef {
                    subscription_id: metadata_uuid(&sub.metadata, "subscription_id"),
                    provider_subscription_id: Some(sub.id.clone()),
                    object_id: sub.id,
                }))
            }
            WebhookEventType::ChargeRefunded | WebhookEventType::DisputeCreated => {
                let charge: RawCharge = serde_json::from_value(object).map_err(parse_err)?;
                Ok(WebhookEventData::Charge(ChargeData {
                    object_id: charge.id,
                    payment_intent_id: charge.payment_intent,
                }))
            }
            WebhookEventType::Unknown(name) => {
                info!(event_type = %name, "Received unknown webhook event type");
                Ok(WebhookEventData::Raw(object))
            }
        }
    }
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHandler").finish_non_exhaustive()
    }
}

fn metadata_uuid(metadata: &HashMap<String, String>, key: &str) -> Option<Uuid> {
    metadata.get(key).and_then(|v| Uuid::parse_str(v).ok())
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
    #[serde(default)]
    created: i64,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawInvoice {
    id: String,
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    lines: RawInvoiceLines,
}

impl RawInvoice {
    /// Subscription period from the first line item that has one
    fn line_period(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.lines.data.iter().find_map(|line| {
            let period = line.period.as_ref()?;
            Some((
                DateTime::from_timestamp(period.start, 0)?,
                DateTime::from_timestamp(period.end, 0)?,
            ))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawInvoiceLines {
    #[serde(default)]
    data: Vec<RawInvoiceLine>,
}

#[derive(Debug, Deserialize)]
struct RawInvoiceLine {
    period: Option<RawPeriod>,
}

#[derive(Debug, Deserialize)]
struct RawPeriod {
    start: i64,
    end: i64,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawCharge {
    id: String,
    payment_intent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn payload(event_type: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": event_type,
            "created": Utc::now().timestamp(),
            "data": { "object": {
                "id": "pi_1",
                "amount": 1200,
                "currency": "usd",
                "status": "succeeded",
                "metadata": { "user_id": Uuid::nil().to_string() }
            }}
        }))
        .unwrap()
    }

    #[test]
    fn valid_signature_parses_event() {
        let handler = WebhookHandler::new(SECRET);
        let body = payload("payment_intent.succeeded");
        let sig = sign_payload(SECRET, &body, Utc::now().timestamp()).unwrap();

        let event = handler.verify_and_parse(&body, &sig).unwrap();
        assert_eq!(event.event_type, WebhookEventType::PaymentIntentSucceeded);
        assert!((Utc::now().timestamp() - event.created).abs() < TOLERANCE_SECS);
        match event.data {
            WebhookEventData::PaymentIntent(data) => {
                assert_eq!(data.intent_id, "pi_1");
                assert_eq!(data.user_id, Some(Uuid::nil()));
                assert_eq!(data.subscription_id, None);
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn wrong_secret_rejected() {
        let handler = WebhookHandler::new(SECRET);
        let body = payload("payment_intent.succeeded");
        let sig = sign_payload("whsec_other", &body, Utc::now().timestamp()).unwrap();

        let err = handler.verify_and_parse(&body, &sig).unwrap_err();
        assert!(matches!(err, BillingError::SignatureInvalid(_)));
    }

    #[test]
    fn tampered_payload_rejected() {
        let handler = WebhookHandler::new(SECRET);
        let body = payload("payment_intent.succeeded");
        let sig = sign_payload(SECRET, &body, Utc::now().timestamp()).unwrap();

        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");
        assert!(handler.verify_and_parse(&tampered, &sig).is_err());
    }

    #[test]
    fn stale_timestamp_rejected() {
        let handler = WebhookHandler::new(SECRET);
        let body = payload("payment_intent.succeeded");
        let ts = Utc::now().timestamp() - TOLERANCE_SECS - 60;
        let sig = sign_payload(SECRET, &body, ts).unwrap();

        assert!(handler.verify_and_parse(&body, &sig).unwrap_err().is_bad_webhook());
    }

    #[test]
    fn header_without_parts_rejected() {
        let handler = WebhookHandler::new(SECRET);
        let body = payload("payment_intent.succeeded");
        for header in ["", "garbage", "t=123", "v1=abc"] {
            let err = handler.verify_and_parse(&body, header).unwrap_err();
            assert!(matches!(err, BillingError::SignatureInvalid(_)), "{header}");
        }
    }

    #[test]
    fn unknown_event_is_kept_raw() {
        let handler = WebhookHandler::new(SECRET);
        let body = payload("customer.created");
        let sig = sign_payload(SECRET, &body, Utc::now().timestamp()).unwrap();

        let event = handler.verify_and_parse(&body, &sig).unwrap();
        assert!(matches!(event.event_type, WebhookEventType::Unknown(_)));
        assert!(matches!(event.data, WebhookEventData::Raw(_)));
    }

    #[test]
    fn signed_garbage_is_a_parse_error() {
        let handler = WebhookHandler::new(SECRET);
        let body = b"not json".to_vec();
        let sig = sign_payload(SECRET, &body, Utc::now().timestamp()).unwrap();

        let err = handler.verify_and_parse(&body, &sig).unwrap_err();
        assert!(matches!(err, BillingError::WebhookError(_)));
    }

    #[test]
    fn invoice_carries_line_period() {
        let handler = WebhookHandler::new(SECRET);
        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt_2",
            "type": "invoice.paid",
            "created": Utc::now().timestamp(),
            "data": { "object": {
                "id": "in_1",
                "subscription": "sub_1",
                "lines": { "data": [
                    { "period": { "start": 1_767_225_600, "end": 1_769_904_000 } }
                ]}
            }}
        }))
        .unwrap();
        let sig = sign_payload(SECRET, &body, Utc::now().timestamp()).unwrap();

        match handler.verify_and_parse(&body, &sig).unwrap().data {
            WebhookEventData::Invoice(invoice) => {
                assert_eq!(
                    invoice.subscription.provider_subscription_id.as_deref(),
                    Some("sub_1")
                );
                let (start, end) = invoice.period.unwrap();
                assert_eq!(start.timestamp(), 1_767_225_600);
                assert_eq!(end.timestamp(), 1_769_904_000);
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }
}
