//! Stripe payment provider implementation

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use taskflow_types::{IntentStatus, PaymentIntent};

use crate::config::BillingConfig;
use crate::error::BillingError;
use crate::provider::{CardDetails, IntentRequest, PaymentProvider};

/// Stripe payment provider
#[derive(Clone)]
pub struct StripeProvider {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Make authenticated request to Stripe
    async fn stripe_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<T, BillingError> {
        let url = format!("{}{endpoint}", self.api_base);

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.secret_key, Option::<&str>::None);

        if let Some(form_data) = form {
            request = request.form(form_data);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Stripe API request failed");
            BillingError::ProviderError(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Stripe API error");
            return Err(BillingError::ProviderError(format!(
                "Stripe API error: {status}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Stripe response");
            BillingError::ProviderError(e.to_string())
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id, tier = %request.tier))]
    async fn create_payment_intent(
        &self,
        request: &IntentRequest,
    ) -> Result<PaymentIntent, BillingError> {
        debug!(amount = request.amount_cents, "Creating payment intent");

        let amount = request.amount_cents.to_string();
        let user_id = request.user_id.to_string();
        let subscription_id = request.subscription_id.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[user_id]", user_id.as_str()),
            ("metadata[subscription_id]", subscription_id.as_str()),
            ("metadata[tier]", request.tier.as_str()),
        ];

        let intent: StripePaymentIntent = self
            .stripe_request(reqwest::Method::POST, "/payment_intents", Some(&form))
            .await?;

        Ok(intent.into())
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, BillingError> {
        // The expanded invoice carries the Stripe subscription ID.
        let intent: StripePaymentIntent = self
            .stripe_request(
                reqwest::Method::GET,
                &format!("/payment_intents/{intent_id}?expand[]=invoice"),
                None,
            )
            .await?;

        Ok(intent.into())
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), BillingError> {
        debug!("Canceling Stripe subscription");

        let _: StripeSubscription = self
            .stripe_request(
                reqwest::Method::DELETE,
                &format!("/subscriptions/{subscription_id}"),
                None,
            )
            .await?;

        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn describe_payment_method(&self, token: &str) -> Result<CardDetails, BillingError> {
        let method: StripePaymentMethod = self
            .stripe_request(
                reqwest::Method::GET,
                &format!("/payment_methods/{token}"),
                None,
            )
            .await?;

        let card = method.card.unwrap_or_default();
        Ok(CardDetails {
            customer_id: method.customer,
            last_four: card.last4,
            brand: card.brand,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        })
    }
}

impl std::fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeProvider")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Stripe API types
// ============================================================================

/// Stripe payment intent object
#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub invoice: Option<StripeInvoiceRef>,
}

impl StripePaymentIntent {
    /// Stripe subscription paid by this intent, if the invoice was expanded
    pub fn subscription_id(&self) -> Option<&str> {
        match &self.invoice {
            Some(StripeInvoiceRef::Expanded { subscription, .. }) => subscription.as_deref(),
            _ => None,
        }
    }
}

/// An intent's invoice: a bare ID, or the object when expanded
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeInvoiceRef {
    Id(String),
    Expanded {
        id: String,
        subscription: Option<String>,
    },
}

impl From<StripePaymentIntent> for PaymentIntent {
    fn from(intent: StripePaymentIntent) -> Self {
        Self {
            provider_subscription_id: intent.subscription_id().map(str::to_string),
            status: IntentStatus::from_provider(&intent.status),
            id: intent.id,
            client_secret: intent.client_secret,
            amount_cents: intent.amount,
            currency: intent.currency,
        }
    }
}

/// Stripe subscription object
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
}

/// Stripe payment method object
#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentMethod {
    pub id: String,
    pub customer: Option<String>,
    pub card: Option<StripeCard>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
}
