//! Usage ledger
//!
//! Counters live in one row per user and calendar month. Storage is kept in
//! MB as a float; callers pass raw byte counts and the ledger converts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskflow_db::UsageRepository;
use taskflow_types::{period_bounds, Limit, ResourceType, UsageRecord, UserId};

use crate::EntitlementError;

/// Outcome of an atomic compare-and-increment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Consumption {
    /// Quantity was added; `used` is the new counter value
    Consumed { used: f64 },
    /// Adding the quantity would exceed the limit; nothing was written
    Exhausted { used: f64 },
}

impl Consumption {
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed { .. })
    }

    pub fn used(&self) -> f64 {
        match self {
            Self::Consumed { used } | Self::Exhausted { used } => *used,
        }
    }
}

/// Durable per-user, per-period counters
#[derive(Clone)]
pub struct UsageLedger {
    repo: Arc<dyn UsageRepository>,
}

impl UsageLedger {
    pub fn new(repo: Arc<dyn UsageRepository>) -> Self {
        Self { repo }
    }

    /// The current period's record, created zeroed on first use
    pub async fn get_usage(&self, user_id: &UserId) -> Result<UsageRecord, EntitlementError> {
        self.get_usage_at(user_id, Utc::now()).await
    }

    /// The record for the period containing `now`
    ///
    /// A record whose reset date has passed belongs to an earlier period key,
    /// so it is never returned here.
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn get_usage_at(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, EntitlementError> {
        let (period_start, reset_date) = period_bounds(now);
        let row = self
            .repo
            .get_or_create(user_id.0, period_start, reset_date)
            .await?;
        Ok(row.into_record())
    }

    /// Add `quantity` to a counter; storage quantities are bytes.
    ///
    /// Returns the new counter value. Callers on the best-effort path log and
    /// discard the error rather than failing the action that was metered.
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn increment_usage(
        &self,
        user_id: &UserId,
        resource: ResourceType,
        quantity: u64,
    ) -> Result<f64, EntitlementError> {
        let (period_start, reset_date) = period_bounds(Utc::now());
        let used = self
            .repo
            .increment(
                user_id.0,
                period_start,
                reset_date,
                resource,
                resource.to_ledger_units(quantity),
            )
            .await?;

        metrics::counter!("taskflow_usage_tracked_total", "resource" => resource.as_str())
            .increment(quantity);
        tracing::debug!(resource = %resource, used, "Usage tracked");
        Ok(used)
    }

    /// `round(used / limit * 100)` for the current period, capped at 100
    pub async fn usage_percentage(
        &self,
        user_id: &UserId,
        resource: ResourceType,
        limit: Limit,
    ) -> Result<u32, EntitlementError> {
        if limit.is_unlimited() {
            return Ok(0);
        }
        let record = self.get_usage(user_id).await?;
        Ok(limit.percentage(record.used(resource)))
    }

    /// Add `quantity` only if the counter stays within `limit`.
    ///
    /// Check and increment run as one store operation, so concurrent callers
    /// cannot both take the last unit.
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn try_consume(
        &self,
        user_id: &UserId,
        resource: ResourceType,
        quantity: u64,
        limit: Limit,
    ) -> Result<Consumption, EntitlementError> {
        let (period_start, reset_date) = period_bounds(Utc::now());
        let consumed = self
            .repo
            .try_increment(
                user_id.0,
                period_start,
                reset_date,
                resource,
                resource.to_ledger_units(quantity),
                limit.raw(),
            )
            .await?;

        match consumed {
            Some(used) => {
                metrics::counter!("taskflow_usage_tracked_total", "resource" => resource.as_str())
                    .increment(quantity);
                Ok(Consumption::Consumed { used })
            }
            None => {
                let record = self.get_usage(user_id).await?;
                Ok(Consumption::Exhausted {
                    used: record.used(resource),
                })
            }
        }
    }

    /// Zero the current period's counters
    #[tracing::instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn reset_period(&self, user_id: &UserId) -> Result<(), EntitlementError> {
        let (period_start, reset_date) = period_bounds(Utc::now());
        self.repo
            .get_or_create(user_id.0, period_start, reset_date)
            .await?;
        self.repo.reset(user_id.0, period_start).await?;
        tracing::info!("Usage period reset");
        Ok(())
    }
}

impl std::fmt::Debug for UsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLedger").finish()
    }
}
