//! Repository traits
//!
//! Async interfaces over the hosted record store. Services hold these as
//! trait objects so the PostgreSQL and in-memory backends are swappable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use taskflow_types::ResourceType;

use crate::error::DbResult;
use crate::models::*;

/// Plan catalog repository
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// All catalog rows, cheapest first
    async fn list_plans(&self) -> DbResult<Vec<PlanRow>>;

    /// Find the catalog row for a tier
    async fn find_by_tier(&self, tier: &str) -> DbResult<Option<PlanRow>>;
}

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find a subscription by ID
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<SubscriptionRow>>;

    /// Find the active subscription for a user
    async fn find_active_by_user_id(&self, user_id: Uuid) -> DbResult<Option<SubscriptionRow>>;

    /// Most recently created subscription for a user, whatever its status
    async fn find_latest_by_user_id(&self, user_id: Uuid) -> DbResult<Option<SubscriptionRow>>;

    /// Find a subscription by its payment provider ID
    async fn find_by_provider_id(&self, provider_id: &str) -> DbResult<Option<SubscriptionRow>>;

    /// Create a new subscription
    async fn create(&self, sub: CreateSubscription) -> DbResult<SubscriptionRow>;

    /// Update subscription status
    async fn update_status(&self, id: Uuid, status: &str) -> DbResult<()>;

    /// Move the subscription onto a new billing period
    async fn update_period(
        &self,
        id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Mark a subscription canceled
    async fn cancel(&self, id: Uuid) -> DbResult<()>;

    /// Cancel every active subscription of a user except `keep`
    async fn cancel_active_except(&self, user_id: Uuid, keep: Uuid) -> DbResult<u64>;

    /// Attach the provider's identifiers
    async fn set_provider_subscription_id(
        &self,
        id: Uuid,
        provider: &str,
        provider_id: &str,
    ) -> DbResult<()>;
}

/// Create subscription input
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: String,
    pub status: String,
    pub billing_cycle: String,
    pub provider: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

/// Usage ledger repository trait
///
/// Counters are keyed by user and period start. Column selection is driven
/// by [`ResourceType::usage_key`].
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Read the counters for a period
    async fn get(&self, user_id: Uuid, period_start: DateTime<Utc>) -> DbResult<Option<UsageRow>>;

    /// Read the counters for a period, creating a zeroed row if absent
    async fn get_or_create(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
    ) -> DbResult<UsageRow>;

    /// Add `amount` to a counter and return the new value
    async fn increment(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
        resource: ResourceType,
        amount: f64,
    ) -> DbResult<f64>;

    /// Add `amount` only if the result stays within `limit` (`-1` for no cap).
    ///
    /// Returns the new value, or `None` when the limit would be exceeded.
    /// Check and increment happen in one statement.
    async fn try_increment(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
        resource: ResourceType,
        amount: f64,
        limit: i64,
    ) -> DbResult<Option<f64>>;

    /// Zero every counter for a period
    async fn reset(&self, user_id: Uuid, period_start: DateTime<Utc>) -> DbResult<()>;
}

/// Payment transaction repository trait
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Find a transaction by the provider's payment intent ID
    async fn find_by_intent_id(
        &self,
        provider: &str,
        intent_id: &str,
    ) -> DbResult<Option<TransactionRow>>;

    /// Record a new transaction
    async fn create(&self, tx: CreateTransaction) -> DbResult<TransactionRow>;

    /// Move a transaction from `expected` to `next`.
    ///
    /// Returns false if the stored status was not `expected`, which is how
    /// concurrent deliveries of the same event lose the race.
    async fn transition_status(&self, id: Uuid, expected: &str, next: &str) -> DbResult<bool>;
}

/// Create transaction input
#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub provider: String,
    pub provider_payment_intent_id: String,
    pub status: String,
}

/// Payment method repository trait
#[async_trait]
pub trait PaymentMethodRepository: Send + Sync {
    /// All stored methods for a user, default first
    async fn list_by_user(&self, user_id: Uuid) -> DbResult<Vec<PaymentMethodRow>>;

    /// Find a method by ID
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PaymentMethodRow>>;

    /// Store a new method
    async fn create(&self, method: CreatePaymentMethod) -> DbResult<PaymentMethodRow>;

    /// Delete a method, returning whether it existed
    async fn delete(&self, id: Uuid) -> DbResult<bool>;

    /// Make `id` the user's only default method
    async fn set_default(&self, user_id: Uuid, id: Uuid) -> DbResult<()>;
}

/// Create payment method input
#[derive(Debug, Clone)]
pub struct CreatePaymentMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_token: String,
    pub provider_customer_id: Option<String>,
    pub last_four: Option<String>,
    pub brand: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: bool,
}

/// Task repository trait
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a task
    async fn create(&self, task: CreateTask) -> DbResult<TaskRow>;

    /// Archive a user's completed tasks finished before `cutoff`
    async fn archive_completed_before(&self, user_id: Uuid, cutoff: DateTime<Utc>)
        -> DbResult<u64>;
}

/// Create task input
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}
