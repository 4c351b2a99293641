//! Database row models
//!
//! Rows map one-to-one onto table columns. Each row converts into its
//! domain type in `taskflow-types`, rejecting values the domain cannot
//! represent.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use taskflow_types::{
    BillingCycle, Limit, PaymentMethod, PaymentMethodId, PaymentTransaction, Plan, PlanFeatures,
    PlanLimits, Subscription, SubscriptionId, SubscriptionStatus, Tier, TransactionId,
    TransactionStatus, UsageRecord, UserId,
};

use crate::error::DbResult;

/// Plan catalog row
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub tier: String,
    pub name: String,
    pub price_monthly_cents: i64,
    pub price_yearly_cents: i64,
    pub currency: String,
    pub max_tasks_per_month: i64,
    pub max_ai_requests_per_month: i64,
    pub max_notes_per_month: i64,
    pub max_meeting_summaries_per_month: i64,
    pub max_storage_mb: i64,
    pub ai_task_decomposition: bool,
    pub meeting_summarization: bool,
    pub advanced_analytics: bool,
    pub team_collaboration: bool,
    pub priority_support: bool,
    pub custom_integrations: bool,
}

impl PlanRow {
    pub fn into_plan(self) -> DbResult<Plan> {
        Ok(Plan {
            tier: self.tier.parse()?,
            name: self.name,
            price_monthly_cents: self.price_monthly_cents,
            price_yearly_cents: self.price_yearly_cents,
            currency: self.currency,
            limits: PlanLimits {
                max_tasks_per_month: Limit::from_raw(self.max_tasks_per_month)?,
                max_ai_requests_per_month: Limit::from_raw(self.max_ai_requests_per_month)?,
                max_notes_per_month: Limit::from_raw(self.max_notes_per_month)?,
                max_meeting_summaries_per_month: Limit::from_raw(
                    self.max_meeting_summaries_per_month,
                )?,
                max_storage_mb: Limit::from_raw(self.max_storage_mb)?,
            },
            features: PlanFeatures {
                ai_task_decomposition: self.ai_task_decomposition,
                meeting_summarization: self.meeting_summarization,
                advanced_analytics: self.advanced_analytics,
                team_collaboration: self.team_collaboration,
                priority_support: self.priority_support,
                custom_integrations: self.custom_integrations,
            },
        })
    }

    /// Row form of a domain plan, used to seed stores
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            tier: plan.tier.as_str().to_string(),
            name: plan.name.clone(),
            price_monthly_cents: plan.price_monthly_cents,
            price_yearly_cents: plan.price_yearly_cents,
            currency: plan.currency.clone(),
            max_tasks_per_month: plan.limits.max_tasks_per_month.raw(),
            max_ai_requests_per_month: plan.limits.max_ai_requests_per_month.raw(),
            max_notes_per_month: plan.limits.max_notes_per_month.raw(),
            max_meeting_summaries_per_month: plan.limits.max_meeting_summaries_per_month.raw(),
            max_storage_mb: plan.limits.max_storage_mb.raw(),
            ai_task_decomposition: plan.features.ai_task_decomposition,
            meeting_summarization: plan.features.meeting_summarization,
            advanced_analytics: plan.features.advanced_analytics,
            team_collaboration: plan.features.team_collaboration,
            priority_support: plan.features.priority_support,
            custom_integrations: plan.features.custom_integrations,
        }
    }
}

/// Subscription row
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: String,
    pub status: String,
    pub billing_cycle: String,
    pub provider: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    pub fn into_subscription(self) -> DbResult<Subscription> {
        Ok(Subscription {
            id: SubscriptionId(self.id),
            user_id: UserId(self.user_id),
            tier: self.tier.parse::<Tier>()?,
            status: self.status.parse::<SubscriptionStatus>()?,
            billing_cycle: self.billing_cycle.parse::<BillingCycle>()?,
            provider: self.provider,
            provider_subscription_id: self.provider_subscription_id,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            canceled_at: self.canceled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Usage counters for one user and period
#[derive(Debug, Clone, FromRow)]
pub struct UsageRow {
    pub user_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub reset_date: DateTime<Utc>,
    pub tasks_used: i64,
    pub ai_requests_used: i64,
    pub notes_used: i64,
    pub meeting_summaries_used: i64,
    pub storage_used_mb: f64,
}

impl UsageRow {
    /// Negative counters never appear in a healthy store; they clamp to zero.
    pub fn into_record(self) -> UsageRecord {
        let count = |n: i64| n.max(0) as u64;
        UsageRecord {
            user_id: UserId(self.user_id),
            tasks_used: count(self.tasks_used),
            ai_requests_used: count(self.ai_requests_used),
            notes_used: count(self.notes_used),
            meeting_summaries_used: count(self.meeting_summaries_used),
            storage_used_mb: self.storage_used_mb.max(0.0),
            period_start: self.period_start,
            reset_date: self.reset_date,
        }
    }
}

/// Payment transaction row
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub provider: String,
    pub provider_payment_intent_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn into_transaction(self) -> DbResult<PaymentTransaction> {
        Ok(PaymentTransaction {
            id: TransactionId(self.id),
            user_id: UserId(self.user_id),
            subscription_id: self.subscription_id.map(SubscriptionId),
            amount_cents: self.amount_cents,
            currency: self.currency,
            provider: self.provider,
            provider_payment_intent_id: self.provider_payment_intent_id,
            status: self.status.parse::<TransactionStatus>()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Stored payment method row
#[derive(Debug, Clone, FromRow)]
pub struct PaymentMethodRow {
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
    pub created_at: DateTime<Utc>,
}

impl PaymentMethodRow {
    pub fn into_method(self) -> PaymentMethod {
        PaymentMethod {
            id: PaymentMethodId(self.id),
            user_id: UserId(self.user_id),
            provider: self.provider,
            provider_token: self.provider_token,
            provider_customer_id: self.provider_customer_id,
            last_four: self.last_four,
            brand: self.brand,
            exp_month: self.exp_month.and_then(|m| u32::try_from(m).ok()),
            exp_year: self.exp_year.and_then(|y| u32::try_from(y).ok()),
            is_default: self.is_default,
            created_at: self.created_at,
        }
    }
}

/// Task row
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_row_converts_sentinel_limits() {
        let row = PlanRow::from_plan(&Plan::builtin(Tier::Enterprise));
        assert_eq!(row.max_tasks_per_month, -1);

        let plan = row.into_plan().unwrap();
        assert!(plan.limits.max_storage_mb.is_unlimited());
    }

    #[test]
    fn plan_row_rejects_negative_limits() {
        let mut row = PlanRow::from_plan(&Plan::builtin(Tier::Free));
        row.max_notes_per_month = -5;
        assert!(row.into_plan().is_err());
    }

    #[test]
    fn usage_row_clamps_negative_counters() {
        let now = Utc::now();
        let row = UsageRow {
            user_id: Uuid::new_v4(),
            period_start: now,
            reset_date: now,
            tasks_used: -3,
            ai_requests_used: 4,
            notes_used: 0,
            meeting_summaries_used: 0,
            storage_used_mb: -1.0,
        };
        let record = row.into_record();
        assert_eq!(record.tasks_used, 0);
        assert_eq!(record.ai_requests_used, 4);
        assert_eq!(record.storage_used_mb, 0.0);
    }

    #[test]
    fn subscription_row_with_unknown_status_is_invalid() {
        let now = Utc::now();
        let row = SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            tier: "pro".into(),
            status: "trialing".into(),
            billing_cycle: "monthly".into(),
            provider: None,
            provider_subscription_id: None,
            current_period_start: now,
            current_period_end: now,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(row.into_subscription().is_err());
    }
}
