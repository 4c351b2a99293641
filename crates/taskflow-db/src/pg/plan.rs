//! PostgreSQL plan catalog repository

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::PlanRow;
use crate::repo::PlanRepository;

const PLAN_COLUMNS: &str = "tier, name, price_monthly_cents, price_yearly_cents, currency, \
    max_tasks_per_month, max_ai_requests_per_month, max_notes_per_month, \
    max_meeting_summaries_per_month, max_storage_mb, ai_task_decomposition, \
    meeting_summarization, advanced_analytics, team_collaboration, priority_support, \
    custom_integrations";

/// PostgreSQL plan repository
#[derive(Clone)]
pub struct PgPlanRepository {
    pool: PgPool,
}

impl PgPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for PgPlanRepository {
    async fn list_plans(&self) -> DbResult<Vec<PlanRow>> {
        let plans = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans ORDER BY price_monthly_cents"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }

    async fn find_by_tier(&self, tier: &str) -> DbResult<Option<PlanRow>> {
        let plan = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE tier = $1"
        ))
        .bind(tier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }
}
