//! Usage ledger types

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Limit, ResourceType, UserId};

/// First instant of the calendar month containing `now`, and of the next one.
pub fn period_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    // Day 1 at midnight always exists in UTC.
    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    (start, end)
}

/// Running counters for one user and one billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: UserId,
    pub tasks_used: u64,
    pub ai_requests_used: u64,
    pub notes_used: u64,
    pub meeting_summaries_used: u64,
    pub storage_used_mb: f64,
    pub period_start: DateTime<Utc>,
    /// When the counters roll over
    pub reset_date: DateTime<Utc>,
}

impl UsageRecord {
    /// A zeroed record for the period containing `now`
    pub fn zeroed(user_id: UserId, now: DateTime<Utc>) -> Self {
        let (period_start, reset_date) = period_bounds(now);
        Self {
            user_id,
            tasks_used: 0,
            ai_requests_used: 0,
            notes_used: 0,
            meeting_summaries_used: 0,
            storage_used_mb: 0.0,
            period_start,
            reset_date,
        }
    }

    /// Counter value for a resource, in ledger units
    pub fn used(&self, resource: ResourceType) -> f64 {
        match resource {
            ResourceType::Tasks => self.tasks_used as f64,
            ResourceType::AiRequests => self.ai_requests_used as f64,
            ResourceType::Notes => self.notes_used as f64,
            ResourceType::MeetingSummaries => self.meeting_summaries_used as f64,
            ResourceType::Storage => self.storage_used_mb,
        }
    }

    /// Whether this record still covers `now`
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        now >= self.period_start && now < self.reset_date
    }
}

/// Usage of one resource against its plan limit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub used: f64,
    pub limit: Limit,
    pub percentage: u32,
}

impl ResourceStatus {
    pub fn new(used: f64, limit: Limit) -> Self {
        Self {
            used,
            limit,
            percentage: limit.percentage(used),
        }
    }

    /// Placeholder used when the user has no subscription row yet
    pub fn placeholder() -> Self {
        Self {
            used: 0.0,
            limit: Limit::Capped(0),
            percentage: 0,
        }
    }
}
