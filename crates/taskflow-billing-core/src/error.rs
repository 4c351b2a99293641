//! Billing errors

use taskflow_types::{SubscriptionStatus, TypeError};
use thiserror::Error;

/// Billing errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Subscription not found
    #[error("subscription not found")]
    SubscriptionNotFound,

    /// No transaction recorded for the payment intent
    #[error("transaction not found")]
    TransactionNotFound,

    /// Payment method not found for this user
    #[error("payment method not found")]
    PaymentMethodNotFound,

    /// Tier cannot be purchased
    #[error("invalid tier: {0}")]
    InvalidTier(String),

    /// Subscription status change not permitted
    #[error("invalid subscription transition: {from} -> {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// Webhook signature absent, malformed, stale or wrong
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Webhook payload could not be parsed
    #[error("webhook error: {0}")]
    WebhookError(String),

    /// Payment provider error
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] taskflow_db::DbError),

    /// Plan catalog error
    #[error("entitlement error: {0}")]
    Entitlement(#[from] taskflow_entitlement::EntitlementError),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TypeError> for BillingError {
    fn from(err: TypeError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl BillingError {
    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionNotFound | Self::TransactionNotFound | Self::PaymentMethodNotFound
        )
    }

    /// Check if this is a provider error
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::ProviderError(_))
    }

    /// Errors caused by the webhook request itself rather than by us
    pub fn is_bad_webhook(&self) -> bool {
        matches!(self, Self::SignatureInvalid(_) | Self::WebhookError(_))
    }
}
