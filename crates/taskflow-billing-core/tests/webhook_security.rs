//! Webhook security and lifecycle tests
//!
//! Drives `BillingService::process_webhook` against the in-memory store to
//! check that unverified payloads change nothing and that re-delivered events
//! are applied once.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use taskflow_billing_core::{
    sign_payload, BillingError, BillingService, SandboxProvider, WebhookEventType, WebhookHandler,
};
use taskflow_db::memory::MemoryStore;
use taskflow_db::{Repositories, SubscriptionRow};
use taskflow_entitlement::{EntitlementChecker, PlanCatalog, UsageLedger};
use taskflow_types::{BillingCycle, IntentStatus, Tier, UserId};

const SECRET: &str = "whsec_test_secret_key";

struct Harness {
    store: MemoryStore,
    repos: Repositories,
    billing: BillingService,
}

/// Billing service whose sandbox intents stay in `processing`
fn harness() -> Harness {
    let store = MemoryStore::seeded();
    let repos = Repositories::memory(store.clone());
    let checker = EntitlementChecker::new(
        PlanCatalog::new(repos.plans.clone()),
        UsageLedger::new(repos.usage.clone()),
        repos.subscriptions.clone(),
    );
    let billing = BillingService::new(
        repos.clone(),
        Arc::new(SandboxProvider::with_initial_status(IntentStatus::Processing)),
        WebhookHandler::new(SECRET),
        checker,
    );
    Harness {
        store,
        repos,
        billing,
    }
}

/// Serialize a provider event around `object`
fn event_payload(event_type: &str, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": { "object": object }
    }))
    .unwrap()
}

fn sign(payload: &[u8]) -> String {
    sign_payload(SECRET, payload, Utc::now().timestamp()).unwrap()
}

async fn subscription_row(h: &Harness, id: Uuid) -> SubscriptionRow {
    h.repos
        .subscriptions
        .find_by_id(id)
        .await
        .unwrap()
        .unwrap()
}

async fn subscription_status(h: &Harness, id: Uuid) -> String {
    subscription_row(h, id).await.status
}

async fn transaction_status(h: &Harness, intent_id: &str) -> String {
    h.repos
        .transactions
        .find_by_intent_id("sandbox", intent_id)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn test_invalid_signature_changes_nothing() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();

    let payload = event_payload(
        "payment_intent.succeeded",
        json!({ "id": created.payment_intent.id, "amount": 1200, "currency": "usd" }),
    );
    let forged = sign_payload("whsec_wrong", &payload, Utc::now().timestamp()).unwrap();

    let err = h.billing.process_webhook(&payload, &forged).await.unwrap_err();
    assert!(matches!(err, BillingError::SignatureInvalid(_)));
    assert!(err.is_bad_webhook());

    assert_eq!(
        subscription_status(&h, created.subscription.id.0).await,
        "inactive"
    );
    assert_eq!(
        transaction_status(&h, &created.payment_intent.id).await,
        "pending"
    );
}

#[tokio::test]
async fn test_malformed_signature_header_rejected() {
    let h = harness();
    let payload = event_payload("invoice.paid", json!({ "id": "in_1" }));

    for header in ["", "v1=abc123", "t=1234567890", "invalid_format"] {
        let err = h.billing.process_webhook(&payload, header).await.unwrap_err();
        assert!(
            matches!(err, BillingError::SignatureInvalid(_)),
            "header {header:?} gave {err:?}"
        );
    }
}

#[tokio::test]
async fn test_replayed_signature_rejected() {
    let h = harness();
    let payload = event_payload("invoice.paid", json!({ "id": "in_1" }));
    let old = sign_payload(SECRET, &payload, Utc::now().timestamp() - 600).unwrap();

    let err = h.billing.process_webhook(&payload, &old).await.unwrap_err();
    assert!(matches!(err, BillingError::SignatureInvalid(_)));
}

#[tokio::test]
async fn test_signed_garbage_is_a_webhook_error() {
    let h = harness();
    let payload = b"not json".to_vec();
    let err = h
        .billing
        .process_webhook(&payload, &sign(&payload))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::WebhookError(_)));
}

#[tokio::test]
async fn test_intent_succeeded_activates_once() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();

    let payload = event_payload(
        "payment_intent.succeeded",
        json!({
            "id": created.payment_intent.id,
            "amount": 1200,
            "currency": "usd",
            "status": "succeeded"
        }),
    );

    for _ in 0..3 {
        let kind = h
            .billing
            .process_webhook(&payload, &sign(&payload))
            .await
            .unwrap();
        assert_eq!(kind, WebhookEventType::PaymentIntentSucceeded);
    }

    assert_eq!(
        subscription_status(&h, created.subscription.id.0).await,
        "active"
    );
    assert_eq!(
        transaction_status(&h, &created.payment_intent.id).await,
        "completed"
    );
    assert_eq!(h.store.transaction_count(), 1);
}

#[tokio::test]
async fn test_unseen_intent_recorded_from_metadata_once() {
    let h = harness();
    let user = UserId::new();
    let payload = event_payload(
        "payment_intent.succeeded",
        json!({
            "id": "pi_external_1",
            "amount": 4900,
            "currency": "usd",
            "metadata": { "user_id": user.to_string() }
        }),
    );

    h.billing
        .process_webhook(&payload, &sign(&payload))
        .await
        .unwrap();
    h.billing
        .process_webhook(&payload, &sign(&payload))
        .await
        .unwrap();

    assert_eq!(h.store.transaction_count(), 1);
    assert_eq!(transaction_status(&h, "pi_external_1").await, "completed");
}

#[tokio::test]
async fn test_intent_without_owner_is_acknowledged() {
    let h = harness();
    let payload = event_payload(
        "payment_intent.succeeded",
        json!({ "id": "pi_orphan", "amount": 100, "currency": "usd" }),
    );

    h.billing
        .process_webhook(&payload, &sign(&payload))
        .await
        .unwrap();
    assert_eq!(h.store.transaction_count(), 0);
}

#[tokio::test]
async fn test_failed_intent_marks_transaction_failed() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();

    let payload = event_payload(
        "payment_intent.payment_failed",
        json!({ "id": created.payment_intent.id, "amount": 1200, "currency": "usd" }),
    );
    h.billing
        .process_webhook(&payload, &sign(&payload))
        .await
        .unwrap();

    assert_eq!(
        transaction_status(&h, &created.payment_intent.id).await,
        "failed"
    );
    assert_eq!(
        subscription_status(&h, created.subscription.id.0).await,
        "inactive"
    );
}

#[tokio::test]
async fn test_invoice_events_toggle_past_due() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();
    let sub_id = created.subscription.id.0;

    let paid = event_payload(
        "payment_intent.succeeded",
        json!({ "id": created.payment_intent.id, "amount": 1200, "currency": "usd" }),
    );
    h.billing.process_webhook(&paid, &sign(&paid)).await.unwrap();

    let invoice = json!({
        "id": "in_1",
        "subscription": null,
        "metadata": { "subscription_id": sub_id.to_string() }
    });

    let failed = event_payload("invoice.payment_failed", invoice.clone());
    h.billing
        .process_webhook(&failed, &sign(&failed))
        .await
        .unwrap();
    assert_eq!(subscription_status(&h, sub_id).await, "past_due");

    let recovered = event_payload("invoice.paid", invoice);
    h.billing
        .process_webhook(&recovered, &sign(&recovered))
        .await
        .unwrap();
    assert_eq!(subscription_status(&h, sub_id).await, "active");
}

#[tokio::test]
async fn test_subscription_deleted_cancels() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();
    let sub_id = created.subscription.id.0;

    let payload = event_payload(
        "customer.subscription.deleted",
        json!({ "id": "sub_remote_1", "metadata": { "subscription_id": sub_id.to_string() } }),
    );
    h.billing
        .process_webhook(&payload, &sign(&payload))
        .await
        .unwrap();

    assert_eq!(subscription_status(&h, sub_id).await, "canceled");
}

#[tokio::test]
async fn test_provider_only_subscription_deleted_cancels() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();
    let sub_id = created.subscription.id.0;

    let paid = event_payload(
        "payment_intent.succeeded",
        json!({
            "id": created.payment_intent.id,
            "amount": 1200,
            "currency": "usd",
            "invoice": { "id": "in_remote_1", "subscription": "sub_remote_1" }
        }),
    );
    h.billing.process_webhook(&paid, &sign(&paid)).await.unwrap();

    let row = subscription_row(&h, sub_id).await;
    assert_eq!(row.status, "active");
    assert_eq!(row.provider_subscription_id.as_deref(), Some("sub_remote_1"));

    let deleted = event_payload(
        "customer.subscription.deleted",
        json!({ "id": "sub_remote_1", "metadata": {} }),
    );
    h.billing
        .process_webhook(&deleted, &sign(&deleted))
        .await
        .unwrap();

    assert_eq!(subscription_status(&h, sub_id).await, "canceled");
}

#[tokio::test]
async fn test_activation_links_provider_subscription() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();
    let sub_id = created.subscription.id.0;

    // No invoice on the event; the link comes from the provider.
    let paid = event_payload(
        "payment_intent.succeeded",
        json!({ "id": created.payment_intent.id, "amount": 1200, "currency": "usd" }),
    );
    h.billing.process_webhook(&paid, &sign(&paid)).await.unwrap();

    let link = subscription_row(&h, sub_id)
        .await
        .provider_subscription_id
        .unwrap();
    assert!(link.starts_with("sub_sandbox_"));

    let failed = event_payload(
        "invoice.payment_failed",
        json!({ "id": "in_2", "subscription": link }),
    );
    h.billing
        .process_webhook(&failed, &sign(&failed))
        .await
        .unwrap();
    assert_eq!(subscription_status(&h, sub_id).await, "past_due");
}

#[tokio::test]
async fn test_paid_invoice_moves_period_forward() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();
    let sub_id = created.subscription.id.0;

    let paid = event_payload(
        "payment_intent.succeeded",
        json!({
            "id": created.payment_intent.id,
            "amount": 1200,
            "currency": "usd",
            "invoice": { "id": "in_first", "subscription": "sub_remote_2" }
        }),
    );
    h.billing.process_webhook(&paid, &sign(&paid)).await.unwrap();
    let before = subscription_row(&h, sub_id).await;

    let start = before.current_period_end;
    let end = start + chrono::Duration::days(31);
    let renewal = event_payload(
        "invoice.paid",
        json!({
            "id": "in_renewal",
            "subscription": "sub_remote_2",
            "lines": { "data": [
                { "period": { "start": start.timestamp(), "end": end.timestamp() } }
            ]}
        }),
    );
    for _ in 0..2 {
        h.billing
            .process_webhook(&renewal, &sign(&renewal))
            .await
            .unwrap();
    }

    let after = subscription_row(&h, sub_id).await;
    assert_eq!(after.status, "active");
    assert_eq!(after.current_period_start.timestamp(), start.timestamp());
    assert_eq!(after.current_period_end.timestamp(), end.timestamp());
}

#[tokio::test]
async fn test_confirm_while_processing_fails_for_good() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();

    let outcome = h
        .billing
        .confirm_payment(&user, &created.payment_intent.id)
        .await
        .unwrap();
    assert_eq!(outcome.transaction_status.as_str(), "failed");

    let late = event_payload(
        "payment_intent.succeeded",
        json!({ "id": created.payment_intent.id, "amount": 1200, "currency": "usd" }),
    );
    h.billing.process_webhook(&late, &sign(&late)).await.unwrap();

    assert_eq!(
        transaction_status(&h, &created.payment_intent.id).await,
        "failed"
    );
    assert_eq!(
        subscription_status(&h, created.subscription.id.0).await,
        "inactive"
    );
}

#[tokio::test]
async fn test_refund_after_completion() {
    let h = harness();
    let user = UserId::new();
    let created = h
        .billing
        .create_subscription(&user, Tier::Pro, BillingCycle::Monthly)
        .await
        .unwrap();
    let intent_id = created.payment_intent.id.clone();

    // A refund for a payment that never completed is ignored.
    let refund = event_payload(
        "charge.refunded",
        json!({ "id": "ch_1", "payment_intent": intent_id }),
    );
    h.billing
        .process_webhook(&refund, &sign(&refund))
        .await
        .unwrap();
    assert_eq!(transaction_status(&h, &intent_id).await, "pending");

    let paid = event_payload(
        "payment_intent.succeeded",
        json!({ "id": intent_id, "amount": 1200, "currency": "usd" }),
    );
    h.billing.process_webhook(&paid, &sign(&paid)).await.unwrap();

    h.billing
        .process_webhook(&refund, &sign(&refund))
        .await
        .unwrap();
    assert_eq!(transaction_status(&h, &intent_id).await, "refunded");
}

#[tokio::test]
async fn test_unknown_event_acknowledged() {
    let h = harness();
    let payload = event_payload("customer.created", json!({ "id": "cus_1" }));

    let kind = h
        .billing
        .process_webhook(&payload, &sign(&payload))
        .await
        .unwrap();
    assert_eq!(kind, WebhookEventType::Unknown("customer.created".into()));
}
