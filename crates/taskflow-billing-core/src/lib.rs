//! TaskFlow Billing Core - Billing gateway
//!
//! Bridges payment-provider lifecycles into subscription and transaction
//! state. One [`PaymentProvider`] trait with two implementations, chosen by
//! configuration:
//!
//! - [`StripeProvider`]: Stripe REST API
//! - [`SandboxProvider`]: in-process gateway for local runs and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use taskflow_billing_core::{BillingConfig, BillingService, ProviderKind};
//!
//! let config = BillingConfig::new(ProviderKind::Stripe, "sk_test_...", "whsec_...");
//! let billing = BillingService::new(repos, config.build_provider(), config.webhook_handler(), checker);
//!
//! let created = billing.create_subscription(&user_id, Tier::Pro, BillingCycle::Monthly).await?;
//! // hand created.payment_intent.client_secret to the browser
//! billing.confirm_payment(&user_id, &created.payment_intent.id).await?;
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod sandbox;
pub mod service;
pub mod stripe;
pub mod webhook;

pub use config::{BillingConfig, ProviderKind};
pub use error::BillingError;
pub use provider::{CardDetails, IntentRequest, PaymentProvider};
pub use sandbox::SandboxProvider;
pub use service::{
    AddPaymentMethod, BillingService, ConfirmOutcome, CreatedSubscription, PlanChange,
};
pub use stripe::StripeProvider;
pub use webhook::{sign_payload, WebhookEvent, WebhookEventData, WebhookEventType, WebhookHandler};
