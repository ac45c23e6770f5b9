use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::plan::{Plan, PlanInput};

#[derive(Debug, Clone)]
pub struct PlanRepository {
    pool: PgPool,
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, only_active: bool) -> Result<Vec<Plan>> {
        sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE ($1 = FALSE OR is_active = TRUE) ORDER BY sort_order ASC, price ASC, id ASC",
        )
        .bind(only_active)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch plans")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Plan>> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch plan by ID")
    }

    pub async fn create(&self, input: &PlanInput) -> Result<Plan> {
        sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO plans (name, description, price, currency, duration_days, traffic_limit_gb, device_limit, is_active, sort_order)
            VALUES ($1, $2, $3, COALESCE($4, 'USD'), $5, COALESCE($6, 0), COALESCE($7, 3), COALESCE($8, TRUE), COALESCE($9, 0))
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.currency.as_deref())
        .bind(input.duration_days)
        .bind(input.traffic_limit_gb)
        .bind(input.device_limit)
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create plan")
    }

    pub async fn update(&self, id: i64, input: &PlanInput) -> Result<Option<Plan>> {
        sqlx::query_as::<_, Plan>(
            r#"
            UPDATE plans SET
                name = $2,
                description = $3,
                price = $4,
                currency = COALESCE($5, currency),
                duration_days = $6,
                traffic_limit_gb = COALESCE($7, traffic_limit_gb),
                device_limit = COALESCE($8, device_limit),
                is_active = COALESCE($9, is_active),
                sort_order = COALESCE($10, sort_order),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.currency.as_deref())
        .bind(input.duration_days)
        .bind(input.traffic_limit_gb)
        .bind(input.device_limit)
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update plan")
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM plans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete plan")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_active_subscriptions(&self, id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE plan_id = $1 AND status = 'active'")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count plan subscriptions")
    }
}
