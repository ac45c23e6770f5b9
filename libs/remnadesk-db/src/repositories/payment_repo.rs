use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::page::Pagination;
use crate::models::payment::Payment;

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment by ID")
    }

    pub async fn create(
        &self,
        user_id: i64,
        gateway_id: i64,
        plan_id: Option<i64>,
        amount: i64,
        fee: i64,
        currency: &str,
    ) -> Result<Payment> {
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (user_id, gateway_id, plan_id, amount, fee, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(gateway_id)
        .bind(plan_id)
        .bind(amount)
        .bind(fee)
        .bind(currency)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create payment")
    }

    pub async fn set_payment_url(&self, id: i64, url: &str) -> Result<()> {
        sqlx::query("UPDATE payments SET payment_url = $2 WHERE id = $1")
            .bind(id)
            .bind(url)
            .execute(&self.pool)
            .await
            .context("Failed to store payment URL")?;
        Ok(())
    }

    /// Moves a pending payment to `failed` or `cancelled`. Returns `None` if it was not pending.
    pub async fn close_pending(&self, id: i64, status: &str) -> Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = $2 WHERE id = $1 AND status = 'pending' RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to close payment")
    }

    pub async fn list(
        &self,
        status: Option<&str>,
        user_id: Option<i64>,
        page: &Pagination,
    ) -> Result<(Vec<Payment>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payments WHERE ($1::TEXT IS NULL OR status = $1) AND ($2::BIGINT IS NULL OR user_id = $2)",
        )
        .bind(status)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count payments")?;

        let rows = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE ($1::TEXT IS NULL OR status = $1) AND ($2::BIGINT IS NULL OR user_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status)
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch payments")?;

        Ok((rows, total))
    }
}
