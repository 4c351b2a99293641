//! PostgreSQL payment transaction repository

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::TransactionRow;
use crate::repo::{CreateTransaction, TransactionRepository};

/// PostgreSQL transaction repository
#[derive(Clone)]
pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn find_by_intent_id(
        &self,
        provider: &str,
        intent_id: &str,
    ) -> DbResult<Option<TransactionRow>> {
        let tx = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, subscription_id, amount_cents, currency, provider,
                   provider_payment_intent_id, status, created_at, updated_at
            FROM payment_transactions
            WHERE provider = $1 AND provider_payment_intent_id = $2
            "#,
        )
        .bind(provider)
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tx)
    }

    async fn create(&self, tx: CreateTransaction) -> DbResult<TransactionRow> {
        // A concurrent insert for the same intent returns the stored row.
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO payment_transactions (id, user_id, subscription_id, amount_cents, currency,
                                              provider, provider_payment_intent_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (provider, provider_payment_intent_id)
            DO UPDATE SET updated_at = payment_transactions.updated_at
            RETURNING id, user_id, subscription_id, amount_cents, currency, provider,
                      provider_payment_intent_id, status, created_at, updated_at
            "#,
        )
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(tx.subscription_id)
        .bind(tx.amount_cents)
        .bind(&tx.currency)
        .bind(&tx.provider)
        .bind(&tx.provider_payment_intent_id)
        .bind(&tx.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn transition_status(&self, id: Uuid, expected: &str, next: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
