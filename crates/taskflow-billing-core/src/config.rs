//! Billing configuration

use std::sync::Arc;

use crate::provider::PaymentProvider;
use crate::{BillingError, SandboxProvider, StripeProvider, WebhookHandler};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Which payment provider backs the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Stripe,
    Sandbox,
}

impl ProviderKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Sandbox => "sandbox",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "sandbox" => Ok(Self::Sandbox),
            other => Err(BillingError::Internal(format!(
                "unknown payment provider: {other}"
            ))),
        }
    }
}

/// Billing service configuration
#[derive(Clone)]
pub struct BillingConfig {
    pub provider: ProviderKind,
    /// Provider API secret (unused by the sandbox)
    pub secret_key: String,
    /// Shared secret for webhook signatures
    pub webhook_secret: String,
    /// Provider REST base URL, overridable for tests
    pub api_base: String,
}

impl BillingConfig {
    pub fn new(
        provider: ProviderKind,
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    /// Point the Stripe client at another host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Instantiate the configured provider
    pub fn build_provider(&self) -> Arc<dyn PaymentProvider> {
        match self.provider {
            ProviderKind::Stripe => Arc::new(StripeProvider::new(self)),
            ProviderKind::Sandbox => Arc::new(SandboxProvider::new()),
        }
    }

    pub fn webhook_handler(&self) -> WebhookHandler {
        WebhookHandler::new(&self.webhook_secret)
    }
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingConfig")
            .field("provider", &self.provider)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}
