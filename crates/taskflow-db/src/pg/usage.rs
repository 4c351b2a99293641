//! PostgreSQL usage repository implementation
//!
//! Counter columns are chosen from [`ResourceType::usage_key`], which only
//! yields fixed identifiers, so interpolating them into SQL is safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use taskflow_types::ResourceType;

use crate::error::DbResult;
use crate::models::UsageRow;
use crate::repo::UsageRepository;

const USAGE_COLUMNS: &str = "user_id, period_start, reset_date, tasks_used, ai_requests_used, \
    notes_used, meeting_summaries_used, storage_used_mb";

/// SQL type of the counter column backing a resource
fn column_type(resource: ResourceType) -> &'static str {
    if resource.is_storage() {
        "DOUBLE PRECISION"
    } else {
        "BIGINT"
    }
}

/// PostgreSQL usage repository
#[derive(Clone)]
pub struct PgUsageRepository {
    pool: PgPool,
}

impl PgUsageRepository {
    /// Create a new usage repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    async fn get(&self, user_id: Uuid, period_start: DateTime<Utc>) -> DbResult<Option<UsageRow>> {
        let usage = sqlx::query_as::<_, UsageRow>(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_records WHERE user_id = $1 AND period_start = $2"
        ))
        .bind(user_id)
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(usage)
    }

    async fn get_or_create(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
    ) -> DbResult<UsageRow> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let usage = sqlx::query_as::<_, UsageRow>(&format!(
            r#"
            INSERT INTO usage_records (user_id, period_start, reset_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, period_start)
            DO UPDATE SET reset_date = usage_records.reset_date
            RETURNING {USAGE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(period_start)
        .bind(reset_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(usage)
    }

    async fn increment(
        &self,
        user_id: Uuid,
        period_start: DateTime<Utc>,
        reset_date: DateTime<Utc>,
        resource: ResourceType,
        amount: f64,
    ) -> DbResult<f64> {
        let column = resource.usage_key();
        let ty = column_type(resource);
        let value: f64 = sqlx::query_scalar(&format!(
            r#"
            INSERT INTO usage_records (user_id, period_start, reset_date, {column})
            VALUES ($1, $2, $3, CAST($4 AS {ty}))
            ON CONFLICT (user_id, period_start)
            DO UPDATE SET {column} = usage_records.{column} + EXCLUDED.{column}, updated_at = NOW()
            RETURNING {column}::DOUBLE PRECISION
            "#
        ))
        .bind(user_id)
        .bind(period_start)
        .bind(reset_date)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
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
        self.get_or_create(user_id, period_start, reset_date).await?;

        let column = resource.usage_key();
        let ty = column_type(resource);
        let value: Option<f64> = sqlx::query_scalar(&format!(
            r#"
            UPDATE usage_records
            SET {column} = {column} + CAST($3 AS {ty}), updated_at = NOW()
            WHERE user_id = $1 AND period_start = $2
              AND ($4 < 0 OR {column} + CAST($3 AS {ty}) <= $4)
            RETURNING {column}::DOUBLE PRECISION
            "#
        ))
        .bind(user_id)
        .bind(period_start)
        .bind(amount)
        .bind(limit)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn reset(&self, user_id: Uuid, period_start: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE usage_records
            SET tasks_used = 0, ai_requests_used = 0, notes_used = 0,
                meeting_summaries_used = 0, storage_used_mb = 0, updated_at = NOW()
            WHERE user_id = $1 AND period_start = $2
            "#,
        )
        .bind(user_id)
        .bind(period_start)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
