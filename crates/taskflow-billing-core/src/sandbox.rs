//! In-process sandbox gateway
//!
//! Behaves like a provider that settles every intent immediately unless told
//! otherwise. Every checkout also opens a sandbox-side subscription, reported
//! on the intent the way Stripe reports it on an expanded invoice. Used for
//! local runs (`PAYMENT_PROVIDER=sandbox`) and tests.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use taskflow_types::{IntentStatus, PaymentIntent};

use crate::error::BillingError;
use crate::provider::{CardDetails, IntentRequest, PaymentProvider};

/// Sandbox payment provider
#[derive(Clone)]
pub struct SandboxProvider {
    intents: Arc<DashMap<String, PaymentIntent>>,
    canceled: Arc<DashSet<String>>,
    initial_status: IntentStatus,
}

impl Default for SandboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxProvider {
    /// Intents succeed as soon as they are created
    pub fn new() -> Self {
        Self::with_initial_status(IntentStatus::Succeeded)
    }

    /// Intents start in `status` until changed with [`Self::set_status`]
    pub fn with_initial_status(status: IntentStatus) -> Self {
        Self {
            intents: Arc::new(DashMap::new()),
            canceled: Arc::new(DashSet::new()),
            initial_status: status,
        }
    }

    /// Simulate the customer completing or abandoning a payment
    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(mut intent) = self.intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    /// Whether a sandbox subscription was canceled through the provider API
    pub fn is_canceled(&self, subscription_id: &str) -> bool {
        self.canceled.contains(subscription_id)
    }
}

#[async_trait]
impl PaymentProvider for SandboxProvider {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn create_payment_intent(
        &self,
        request: &IntentRequest,
    ) -> Result<PaymentIntent, BillingError> {
        let id = format!("pi_sandbox_{}", Uuid::new_v4().simple());
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id: id.clone(),
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            status: self.initial_status,
            provider_subscription_id: Some(format!("sub_sandbox_{}", Uuid::new_v4().simple())),
        };
        self.intents.insert(id, intent.clone());
        tracing::debug!(intent_id = %intent.id, "Sandbox payment intent created");
        Ok(intent)
    }

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, BillingError> {
        self.intents
            .get(intent_id)
            .map(|i| i.value().clone())
            .ok_or_else(|| BillingError::ProviderError(format!("no such intent: {intent_id}")))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        self.canceled.insert(subscription_id.to_string());
        tracing::debug!(subscription_id, "Sandbox subscription canceled");
        Ok(())
    }

    async fn describe_payment_method(&self, token: &str) -> Result<CardDetails, BillingError> {
        // Test tokens follow the `pm_card_<brand>` convention.
        let brand = token.strip_prefix("pm_card_").unwrap_or("visa");
        let last_four = match brand {
            "mastercard" => "4444",
            "amex" => "0005",
            _ => "4242",
        };
        Ok(CardDetails {
            customer_id: None,
            last_four: Some(last_four.to_string()),
            brand: Some(brand.to_string()),
            exp_month: Some(12),
            exp_year: Some(2034),
        })
    }
}
