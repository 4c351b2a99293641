//! Integration tests for the Stripe provider
//!
//! A wiremock server stands in for the Stripe REST API.

use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taskflow_billing_core::{
    BillingConfig, IntentRequest, PaymentProvider, ProviderKind, StripeProvider,
};
use taskflow_types::{IntentStatus, SubscriptionId, Tier, UserId};

/// Create a provider pointing at the mock server
fn provider(server: &MockServer) -> StripeProvider {
    let config = BillingConfig::new(ProviderKind::Stripe, "sk_test_123", "whsec_test")
        .with_api_base(server.uri());
    StripeProvider::new(&config)
}

#[tokio::test]
async fn test_create_payment_intent_sends_metadata() {
    let server = MockServer::start().await;
    let user = UserId::new();
    let subscription = SubscriptionId::new();

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .and(header_exists("authorization"))
        .and(body_string_contains("amount=1200"))
        .and(body_string_contains(&format!(
            "metadata%5Buser_id%5D={user}"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "client_secret": "pi_123_secret_abc",
            "amount": 1200,
            "currency": "usd",
            "status": "requires_payment_method"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let intent = provider(&server)
        .create_payment_intent(&IntentRequest {
            amount_cents: 1200,
            currency: "usd".into(),
            user_id: user,
            subscription_id: subscription,
            tier: Tier::Pro,
        })
        .await
        .unwrap();

    assert_eq!(intent.id, "pi_123");
    assert_eq!(intent.client_secret.as_deref(), Some("pi_123_secret_abc"));
    assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
}

#[tokio::test]
async fn test_retrieve_payment_intent_maps_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payment_intents/pi_456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_456",
            "client_secret": null,
            "amount": 4900,
            "currency": "usd",
            "status": "succeeded"
        })))
        .mount(&server)
        .await;

    let intent = provider(&server)
        .retrieve_payment_intent("pi_456")
        .await
        .unwrap();
    assert!(intent.status.is_success());
    assert_eq!(intent.amount_cents, 4900);
}

#[tokio::test]
async fn test_retrieve_payment_intent_reports_subscription() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payment_intents/pi_789"))
        .and(query_param("expand[]", "invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_789",
            "client_secret": null,
            "amount": 4900,
            "currency": "usd",
            "status": "succeeded",
            "invoice": { "id": "in_789", "subscription": "sub_789" }
        })))
        .mount(&server)
        .await;

    let intent = provider(&server)
        .retrieve_payment_intent("pi_789")
        .await
        .unwrap();
    assert_eq!(intent.provider_subscription_id.as_deref(), Some("sub_789"));
}

#[tokio::test]
async fn test_api_error_is_provider_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payment_intents/pi_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "type": "invalid_request_error", "message": "No such payment_intent" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .retrieve_payment_intent("pi_missing")
        .await
        .unwrap_err();
    assert!(err.is_provider_error());
}

#[tokio::test]
async fn test_cancel_subscription() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/subscriptions/sub_789"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sub_789",
            "status": "canceled"
        })))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server).cancel_subscription("sub_789").await.unwrap();
}

#[tokio::test]
async fn test_describe_payment_method_reads_card() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payment_methods/pm_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pm_abc",
            "customer": "cus_1",
            "card": { "brand": "visa", "last4": "4242", "exp_month": 8, "exp_year": 2031 }
        })))
        .mount(&server)
        .await;

    let card = provider(&server)
        .describe_payment_method("pm_abc")
        .await
        .unwrap();
    assert_eq!(card.customer_id.as_deref(), Some("cus_1"));
    assert_eq!(card.last_four.as_deref(), Some("4242"));
    assert_eq!(card.exp_month, Some(8));
}
