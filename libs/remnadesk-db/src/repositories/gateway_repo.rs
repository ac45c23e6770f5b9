use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::gateway::{Gateway, GatewayInput};

#[derive(Debug, Clone)]
pub struct GatewayRepository {
    pool: PgPool,
}

impl GatewayRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Gateway>> {
        sqlx::query_as::<_, Gateway>(
            "SELECT * FROM gateways WHERE ($1 OR is_active = TRUE) ORDER BY is_default DESC, sort_order ASC, id ASC",
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch gateways")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Gateway>> {
        sqlx::query_as::<_, Gateway>("SELECT * FROM gateways WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch gateway by ID")
    }

    pub async fn get_default(&self) -> Result<Option<Gateway>> {
        sqlx::query_as::<_, Gateway>(
            "SELECT * FROM gateways WHERE is_default = TRUE AND is_active = TRUE LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch default gateway")
    }

    pub async fn get_active_by_provider(&self, provider: &str) -> Result<Vec<Gateway>> {
        sqlx::query_as::<_, Gateway>(
            "SELECT * FROM gateways WHERE provider = $1 AND is_active = TRUE ORDER BY is_default DESC, id ASC",
        )
        .bind(provider)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch gateways by provider")
    }

    pub async fn create(&self, input: &GatewayInput, provider: &str) -> Result<Gateway> {
        sqlx::query_as::<_, Gateway>(
            r#"
            INSERT INTO gateways (name, provider, currency, fee_percent, fee_fixed, min_amount, max_amount, config, is_active, sort_order)
            VALUES ($1, $2, COALESCE($3, 'USD'), COALESCE($4, 0), COALESCE($5, 0), COALESCE($6, 0), $7,
                    COALESCE($8, '{}'::jsonb), COALESCE($9, TRUE), COALESCE($10, 0))
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(provider)
        .bind(input.currency.as_deref())
        .bind(input.fee_percent)
        .bind(input.fee_fixed)
        .bind(input.min_amount)
        .bind(input.max_amount)
        .bind(input.config.as_ref())
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create gateway")
    }

    pub async fn update(&self, id: i64, input: &GatewayInput, provider: &str) -> Result<Option<Gateway>> {
        sqlx::query_as::<_, Gateway>(
            r#"
            UPDATE gateways SET
                name = $2,
                provider = $3,
                currency = COALESCE($4, currency),
                fee_percent = COALESCE($5, fee_percent),
                fee_fixed = COALESCE($6, fee_fixed),
                min_amount = COALESCE($7, min_amount),
                max_amount = $8,
                config = COALESCE($9, config),
                is_active = COALESCE($10, is_active),
                sort_order = COALESCE($11, sort_order),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(provider)
        .bind(input.currency.as_deref())
        .bind(input.fee_percent)
        .bind(input.fee_fixed)
        .bind(input.min_amount)
        .bind(input.max_amount)
        .bind(input.config.as_ref())
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update gateway")
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM gateways WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete gateway")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_payments(&self, id: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE gateway_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count gateway payments")
    }
}
