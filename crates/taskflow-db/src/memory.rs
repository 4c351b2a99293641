//! In-memory record store
//!
//! A DashMap-backed implementation of every repository trait. Used by tests
//! and by `DATABASE_URL=memory://` local runs. Failure injection lets tests
//! observe how callers behave when the store is unreachable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use taskflow_types::{Plan, ResourceType, Tier};

use crate::error::{DbError, DbResult};
use crate::models::*;
use crate::repo::*;

/// Shared in-memory tables
#[derive(Default, Clone)]
pub struct MemoryStore {
    plans: Arc<DashMap<String, PlanRow>>,
    subscriptions: Arc<DashMap<Uuid, SubscriptionRow>>,
    usage: Arc<DashMap<(Uuid, DateTime<Utc>), UsageRow>>,
    transactions: Arc<DashMap<Uuid, TransactionRow>>,
    payment_methods: Arc<DashMap<Uuid, PaymentMethodRow>>,
    tasks: Arc<DashMap<Uuid, TaskRow>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    /// An empty store with no plans
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with the built-in plan catalog
    pub fn seeded() -> Self {
        let store = Self::new();
        for tier in Tier::ALL {
            store.insert_plan(PlanRow::from_plan(&Plan::builtin(tier)));
        }
        store
    }

    /// Make every subsequent call fail with [`DbError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn insert_plan(&self, plan: PlanRow) {
        self.plans.insert(plan.tier.clone(), plan);
    }

    pub fn insert_subscription(&self, sub: SubscriptionRow) {
        self.subscriptions.insert(sub.id, sub);
    }

    pub fn insert_usage(&self, usage: UsageRow) {
        self.usage.insert((usage.user_id, usage.period_start), usage);
    }

    pub fn insert_task(&self, task: TaskRow) {
        self.tasks.insert(task.id, task);
    }

    /// Snapshot of a user's tasks
    pub fn tasks_for(&self, user_id: Uuid) -> Vec<TaskRow> {
        self.tasks
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.value().clone())
            .collect()
    }

    /// Snapshot of a user's subscriptions, oldest first
    pub fn subscriptions_for(&self, user_id: Uuid) -> Vec<SubscriptionRow> {
        let mut subs: Vec<_> = self
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect();
        subs.sort_by_key(|s| s.created_at);
        subs
    }

    /// Number of stored payment transactions
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    fn check(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn zeroed_usage(user_id: Uuid, period_start: DateTime<Utc>, reset_date: DateTime<Utc>) -> UsageRow {
        UsageRow {
            user_id,
            period_start,
            reset_date,
            tasks_used: 0,
            ai_requests_used: 0,
            notes_used: 0,
            meeting_summaries_used: 0,
            storage_used_mb: 0.0,
        }
    }
}

fn counter(row: &UsageRow, resource: ResourceType) -> f64 {
    match resource {
        ResourceType::Tasks => row.tasks_used as f64,
        ResourceType::AiRequests => row.ai_requests_used as f64,
        ResourceType::Notes => row.notes_used as f64,
        ResourceType::MeetingSummaries => row.meeting_summaries_used as f64,
        ResourceType::Storage => row.storage_used_mb,
    }
}

fn add(row: &mut UsageRow, resource: ResourceType, amount: f64) -> f64 {
    let whole = amount.round() as i64;
    match resource {
        ResourceType::Tasks => row.tasks_used += whole,
        ResourceType::AiRequests => row.ai_requests_used += whole,
        ResourceType::Notes => row.notes_used += whole,
        ResourceType::MeetingSummaries => row.meeting_summaries_used += whole,
        ResourceType::Storage => row.storage_used_mb += amount,
    }
    counter(row, resource)
}

#[async_trait]
impl PlanRepository for MemoryStore {
    async fn list_plans(&self) -> DbResult<Vec<PlanRow>> {
        self.check()?;
        let mut plans: Vec<_> = self.plans.iter().map(|p| p.value().clone()).collect();
        plans.sort_by_key(|p| p.price_monthly_cents);
        Ok(plans)
    }

    async fn find_by_tier(&self, tier: &str) -> DbResult<Option<PlanRow>> {
        self.check()?;
        Ok(self.plans.get(tier).map(|p| p.value().clone()))
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<SubscriptionRow>> {
        self.check()?;
        Ok(self.subscriptions.get(&id).map(|s| s.value().clone()))
    }

    async fn find_active_by_user_id(&self, user_id: Uuid) -> DbResult<Option<SubscriptionRow>> {
        self.check()?;
        Ok(self
            .subscriptions_for(user_id)
            .into_iter()
            .rev()
            .find(|s| s.status == "active"))
    }

    async fn find_latest_by_user_id(&self, user_id: Uuid) -> DbResult<Option<SubscriptionRow>> {
        self.check()?;
        Ok(self.subscriptions_for(user_id).pop())
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> DbResult<Option<SubscriptionRow>> {
        self.check()?;
        Ok(self
            .subscriptions
            .iter()
            .find(|s| s.provider_subscription_id.as_deref() == Some(provider_id))
            .map(|s| s.value().clone()))
    }

    async fn create(&self, sub: CreateSubscription) -> DbResult<SubscriptionRow> {
        self.check()?;
        let now = Utc::now();
        let row = SubscriptionRow {
            id: sub.id,
            user_id: sub.user_id,
            tier: sub.tier,
            status: sub.status,
            billing_cycle: sub.billing_cycle,
            provider: sub.provider,
            provider_subscription_id: None,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.subscriptions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_status(&self, id: Uuid, status: &str) -> DbResult<()> {
        self.check()?;
        if let Some(mut sub) = self.subscriptions.get_mut(&id) {
            sub.status = status.to_string();
            sub.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_period(
        &self,
        id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> DbResult<()> {
        self.check()?;
        if let Some(mut sub) = self.subscriptions.get_mut(&id) {
            sub.current_period_start = period_start;
            sub.current_period_end = period_end;
            sub.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> DbResult<()> {
        self.check()?;
        if let Some(mut sub) = self.subscriptions.get_mut(&id) {
            let now = Utc::now();
            sub.status = "canceled".to_string();
            sub.canceled_at = Some(now);
            sub.updated_at = now;
        }
        Ok(())
    }

    async fn cancel_active_except(&self, user_id: Uuid, keep: Uuid) -> DbResult<u64> {
        self.check()?;
        let now = Utc::now();
        let mut canceled = 0;
        for mut sub in self.subscriptions.iter_mut() {
            if sub.user_id == user_id && sub.id != keep && sub.status == "active" {
                sub.status = "canceled".to_string();
                sub.canceled_at = Some(now);
                sub.updated_at = now;
                canceled += 1;
            }
        }
        Ok(canceled)
    }

    async fn set_provider_subscription_id(
        &self,
        id: Uuid,
        provider: &str,
        provider_id: &str,
    ) -> DbResult<()> {
        self.check()?;
        if let Some(mut sub) = self.subscriptions.get_mut(&id) {
            sub.provider = Some(provider.to_string());
            sub.provider_subscription_id = Some(provider_id.to_string());
            sub.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl UsageRepository for MemoryStore {
    async fn get(&self, user_id: Uuid, period_start: DateTime<Utc>) -> DbResult<Option<UsageRow>> {
        self.check()?;
        Ok(self
            .usage
            .get(&(user_id, period_start))
            .map(|u| u.value().clone()))
    }

    async fn get_or_create(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
    ) -> DbResult<UsageRow> {
        self.check()?;
        let row = self
            .usage
            .entry((user_id, period_start))
            .or_insert_with(|| Self::zeroed_usage(user_id, period_start, reset_date));
        Ok(row.value().clone())
    }

    async fn increment(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
        resource: ResourceType,
        amount: f64,
    ) -> DbResult<f64> {
        self.check()?;
        let mut row = self
            .usage
            .entry((user_id, period_start))
            .or_insert_with(|| Self::zeroed_usage(user_id, period_start, reset_date));
        Ok(add(&mut row, resource, amount))
    }

    async fn try_increment(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
        resource: ResourceType,
        amount: f64,
        limit: i64,
    ) -> DbResult<Option<f64>> {
        self.check()?;
        // The entry guard holds the shard lock across check and add.
        let mut row = self
            .usage
            .entry((user_id, period_start))
            .or_insert_with(|| Self::zeroed_usage(user_id, period_start, reset_date));
        if limit >= 0 && counter(&row, resource) + amount > limit as f64 {
            return Ok(None);
        }
        Ok(Some(add(&mut row, resource, amount)))
    }

    async fn reset(&self, user_id: Uuid, period_start: DateTime<Utc>) -> DbResult<()> {
        self.check()?;
        if let Some(mut row) = self.usage.get_mut(&(user_id, period_start)) {
            let reset_date = row.reset_date;
            *row = Self::zeroed_usage(user_id, period_start, reset_date);
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn find_by_intent_id(
        &self,
        provider: &str,
        intent_id: &str,
    ) -> DbResult<Option<TransactionRow>> {
        self.check()?;
        Ok(self
            .transactions
            .iter()
            .find(|t| t.provider == provider && t.provider_payment_intent_id == intent_id)
            .map(|t| t.value().clone()))
    }

    async fn create(&self, tx: CreateTransaction) -> DbResult<TransactionRow> {
        self.check()?;
        if let Some(existing) = self
            .find_by_intent_id(&tx.provider, &tx.provider_payment_intent_id)
            .await?
        {
            return Ok(existing);
        }
        let now = Utc::now();
        let row = TransactionRow {
            id: tx.id,
            user_id: tx.user_id,
            subscription_id: tx.subscription_id,
            amount_cents: tx.amount_cents,
            currency: tx.currency,
            provider: tx.provider,
            provider_payment_intent_id: tx.provider_payment_intent_id,
            status: tx.status,
            created_at: now,
            updated_at: now,
        };
        self.transactions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn transition_status(&self, id: Uuid, expected: &str, next: &str) -> DbResult<bool> {
        self.check()?;
        match self.transactions.get_mut(&id) {
            Some(mut tx) if tx.status == expected => {
                tx.status = next.to_string();
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentMethodRepository for MemoryStore {
    async fn list_by_user(&self, user_id: Uuid) -> DbResult<Vec<PaymentMethodRow>> {
        self.check()?;
        let mut methods: Vec<_> = self
            .payment_methods
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.value().clone())
            .collect();
        methods.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(methods)
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PaymentMethodRow>> {
        self.check()?;
        Ok(self.payment_methods.get(&id).map(|m| m.value().clone()))
    }

    async fn create(&self, method: CreatePaymentMethod) -> DbResult<PaymentMethodRow> {
        self.check()?;
        let row = PaymentMethodRow {
            id: method.id,
            user_id: method.user_id,
            provider: method.provider,
            provider_token: method.provider_token,
            provider_customer_id: method.provider_customer_id,
            last_four: method.last_four,
            brand: method.brand,
            exp_month: method.exp_month,
            exp_year: method.exp_year,
            is_default: method.is_default,
            created_at: Utc::now(),
        };
        self.payment_methods.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> DbResult<bool> {
        self.check()?;
        Ok(self.payment_methods.remove(&id).is_some())
    }

    async fn set_default(&self, user_id: Uuid, id: Uuid) -> DbResult<()> {
        self.check()?;
        for mut method in self.payment_methods.iter_mut() {
            if method.user_id == user_id {
                method.is_default = method.id == id;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn create(&self, task: CreateTask) -> DbResult<TaskRow> {
        self.check()?;
        let row = TaskRow {
            id: task.id,
            user_id: task.user_id,
            title: task.title,
            description: task.description,
            status: "todo".to_string(),
            completed_at: None,
            archived: false,
            created_at: Utc::now(),
        };
        self.tasks.insert(row.id, row.clone());
        Ok(row)
    }

    async fn archive_completed_before(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> DbResult<u64> {
        self.check()?;
        let mut archived = 0;
        for mut task in self.tasks.iter_mut() {
            let due = task.completed_at.is_some_and(|at| at < cutoff);
            if task.user_id == user_id && task.status == "done" && !task.archived && due {
                task.archived = true;
                archived += 1;
            }
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use taskflow_types::period_bounds;

    #[tokio::test]
    async fn seeded_store_lists_plans_by_price() {
        let store = MemoryStore::seeded();
        let tiers: Vec<_> = store
            .list_plans()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.tier)
            .collect();
        assert_eq!(tiers, vec!["free", "pro", "enterprise"]);
    }

    #[tokio::test]
    async fn try_increment_refuses_past_limit() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let (start, end) = period_bounds(Utc::now());

        for _ in 0..3 {
            let v = store
                .try_increment(user, start, end, ResourceType::Tasks, 1.0, 3)
                .await
                .unwrap();
            assert!(v.is_some());
        }
        let refused = store
            .try_increment(user, start, end, ResourceType::Tasks, 1.0, 3)
            .await
            .unwrap();
        assert_eq!(refused, None);

        let unlimited = store
            .try_increment(user, start, end, ResourceType::Tasks, 1.0, -1)
            .await
            .unwrap();
        assert_eq!(unlimited, Some(4.0));
    }

    #[tokio::test]
    async fn storage_counter_keeps_fractions() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let (start, end) = period_bounds(Utc::now());

        store
            .increment(user, start, end, ResourceType::Storage, 0.5)
            .await
            .unwrap();
        let total = store
            .increment(user, start, end, ResourceType::Storage, 0.25)
            .await
            .unwrap();
        assert_eq!(total, 0.75);
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = MemoryStore::seeded();
        store.set_unavailable(true);
        assert!(matches!(
            store.list_plans().await,
            Err(DbError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.list_plans().await.is_ok());
    }

    #[tokio::test]
    async fn transition_status_only_from_expected() {
        let store = MemoryStore::new();
        let tx = TransactionRepository::create(
            &store,
            CreateTransaction {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                subscription_id: None,
                amount_cents: 1200,
                currency: "usd".into(),
                provider: "sandbox".into(),
                provider_payment_intent_id: "pi_1".into(),
                status: "pending".into(),
            },
        )
        .await
        .unwrap();

        assert!(store.transition_status(tx.id, "pending", "completed").await.unwrap());
        assert!(!store.transition_status(tx.id, "pending", "completed").await.unwrap());
    }

    #[tokio::test]
    async fn archive_skips_recent_and_open_tasks() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let task = |status: &str, completed: Option<DateTime<Utc>>| TaskRow {
            id: Uuid::new_v4(),
            user_id: user,
            title: "t".into(),
            description: None,
            status: status.into(),
            completed_at: completed,
            archived: false,
            created_at: now,
        };
        store.insert_task(task("done", Some(now - Duration::days(40))));
        store.insert_task(task("done", Some(now - Duration::days(2))));
        store.insert_task(task("todo", None));

        let archived = store
            .archive_completed_before(user, now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(archived, 1);
    }
}
