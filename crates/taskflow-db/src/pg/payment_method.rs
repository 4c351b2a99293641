//! PostgreSQL payment method repository

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::PaymentMethodRow;
use crate::repo::{CreatePaymentMethod, PaymentMethodRepository};

/// PostgreSQL payment method repository
#[derive(Clone)]
pub struct PgPaymentMethodRepository {
    pool: PgPool,
}

impl PgPaymentMethodRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentMethodRepository for PgPaymentMethodRepository {
    async fn list_by_user(&self, user_id: Uuid) -> DbResult<Vec<PaymentMethodRow>> {
        let methods = sqlx::query_as::<_, PaymentMethodRow>(
            r#"
            SELECT id, user_id, provider, provider_token, provider_customer_id, last_four,
                   brand, exp_month, exp_year, is_default, created_at
            FROM payment_methods
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PaymentMethodRow>> {
        let method = sqlx::query_as::<_, PaymentMethodRow>(
            r#"
            SELECT id, user_id, provider, provider_token, provider_customer_id, last_four,
                   brand, exp_month, exp_year, is_default, created_at
            FROM payment_methods
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(method)
    }

    async fn create(&self, method: CreatePaymentMethod) -> DbResult<PaymentMethodRow> {
        let row = sqlx::query_as::<_, PaymentMethodRow>(
            r#"
            INSERT INTO payment_methods (id, user_id, provider, provider_token, provider_customer_id,
                                         last_four, brand, exp_month, exp_year, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, provider, provider_token, provider_customer_id, last_four,
                      brand, exp_month, exp_year, is_default, created_at
            "#,
        )
        .bind(method.id)
        .bind(method.user_id)
        .bind(&method.provider)
        .bind(&method.provider_token)
        .bind(&method.provider_customer_id)
        .bind(&method.last_four)
        .bind(&method.brand)
        .bind(method.exp_month)
        .bind(method.exp_year)
        .bind(method.is_default)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM payment_methods WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_default(&self, user_id: Uuid, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE payment_methods SET is_default = (id = $2) WHERE user_id = $1")
            .bind(user_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
