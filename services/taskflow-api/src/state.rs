//! Application state for the TaskFlow API service.

use std::sync::Arc;

use taskflow_axum::{RateLimitMiddleware, RequestThrottle, TokenValidator};
use taskflow_billing_core::{BillingService, PaymentProvider};
use taskflow_db::{DbPool, Repositories};
use taskflow_entitlement::{EntitlementChecker, PlanCatalog, UsageLedger};

use crate::ai::{HttpDecomposer, TaskDecomposer};
use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Billing gateway (subscriptions, payments, webhooks)
    pub billing: Arc<BillingService>,
    /// Entitlement gates around metered actions
    pub gates: RateLimitMiddleware,
    /// Record store
    pub repos: Repositories,
    pub decomposer: Arc<dyn TaskDecomposer>,
    pub validator: Arc<TokenValidator>,
    pub throttle: Arc<RequestThrottle>,
    /// Database pool; `None` on the in-memory store
    pub pool: Option<DbPool>,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create state with the payment provider named in the configuration
    pub fn new(config: Config, repos: Repositories, pool: Option<DbPool>) -> Self {
        let provider = config.billing.build_provider();
        Self::with_provider(config, repos, pool, provider)
    }

    /// Create state around an explicit payment provider
    pub fn with_provider(
        config: Config,
        repos: Repositories,
        pool: Option<DbPool>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let checker = EntitlementChecker::with_cache_duration(
            PlanCatalog::new(repos.plans.clone()),
            UsageLedger::new(repos.usage.clone()),
            repos.subscriptions.clone(),
            config.entitlement_cache,
        );

        let billing = BillingService::new(
            repos.clone(),
            provider,
            config.billing.webhook_handler(),
            checker.clone(),
        );

        Self {
            billing: Arc::new(billing),
            gates: RateLimitMiddleware::new(checker.clone()),
            repos,
            decomposer: Arc::new(HttpDecomposer::new(&config.ai)),
            validator: Arc::new(TokenValidator::new(&config.supabase.jwt_secret)),
            throttle: Arc::new(RequestThrottle::new(checker)),
            pool,
            config: Arc::new(config),
        }
    }

    /// Replace the AI decomposer
    pub fn with_decomposer(mut self, decomposer: Arc<dyn TaskDecomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    /// Replace the request throttle
    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = Arc::new(throttle);
        self
    }

    /// Get request timeout from config
    pub fn request_timeout(&self) -> std::time::Duration {
        self.config.request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("provider", &self.billing.provider_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
