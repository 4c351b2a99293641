//! Payment provider abstraction

use async_trait::async_trait;

use taskflow_types::{PaymentIntent, SubscriptionId, Tier, UserId};

use crate::BillingError;

/// Parameters for a new payment intent
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub tier: Tier,
}

/// Card details the provider reports for a tokenized method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardDetails {
    pub customer_id: Option<String>,
    pub last_four: Option<String>,
    pub brand: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
}

/// Payment provider trait
///
/// Abstracts payment processing so the gateway logic is shared across
/// providers.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Identifier stored alongside transactions and subscriptions
    fn name(&self) -> &'static str;

    /// Create a payment intent for a subscription charge
    async fn create_payment_intent(
        &self,
        request: &IntentRequest,
    ) -> Result<PaymentIntent, BillingError>;

    /// Fetch the current state of a payment intent
    async fn retrieve_payment_intent(&self, intent_id: &str)
        -> Result<PaymentIntent, BillingError>;

    /// Cancel a provider-side subscription
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError>;

    /// Look up the card behind a tokenized payment method
    async fn describe_payment_method(&self, token: &str) -> Result<CardDetails, BillingError>;
}
