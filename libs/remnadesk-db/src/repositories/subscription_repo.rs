use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::subscription::{Subscription, SubscriptionWithPlan};

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>> {
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch subscription by ID")
    }

    pub async fn get_all_by_user(&self, user_id: i64) -> Result<Vec<SubscriptionWithPlan>> {
        sqlx::query_as::<_, SubscriptionWithPlan>(
            r#"
            SELECT s.id, s.user_id, s.plan_id, p.name AS plan_name, p.traffic_limit_gb, p.device_limit,
                   s.status, s.started_at, s.expires_at, s.traffic_used, s.created_at
            FROM subscriptions s
            JOIN plans p ON s.plan_id = p.id
            WHERE s.user_id = $1
            ORDER BY (s.status = 'active') DESC, s.expires_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch user subscriptions")
    }

    pub async fn set_status(&self, id: i64, status: &str) -> Result<Option<Subscription>> {
        sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update subscription status")
    }

    pub async fn set_remnawave_uuid(&self, id: i64, uuid: Uuid) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET remnawave_uuid = $2 WHERE id = $1")
            .bind(id)
            .bind(uuid)
            .execute(&self.pool)
            .await
            .context("Failed to store Remnawave UUID on subscription")?;
        Ok(())
    }

    /// Flips overdue active subscriptions to `expired`, returning how many changed.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE subscriptions SET status = 'expired' WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to expire subscriptions")?;
        Ok(res.rows_affected())
    }
}
