use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::remnawave::{RemnawaveLink, RemnawaveLinkData};

#[derive(Debug, Clone)]
pub struct RemnawaveRepository {
    pool: PgPool,
}

impl RemnawaveRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<RemnawaveLink>> {
        sqlx::query_as::<_, RemnawaveLink>("SELECT * FROM remnawave_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch Remnawave link")
    }

    pub async fn links_for_user(&self, user_id: i64) -> Result<Vec<RemnawaveLink>> {
        sqlx::query_as::<_, RemnawaveLink>(
            "SELECT * FROM remnawave_links WHERE user_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch Remnawave links for user")
    }

    /// `remnawave_uuid -> user_id` for every stored link.
    pub async fn all_link_owners(&self) -> Result<Vec<(Uuid, i64)>> {
        sqlx::query_as::<_, (Uuid, i64)>("SELECT remnawave_uuid, user_id FROM remnawave_links")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch Remnawave link owners")
    }

    pub async fn insert(&self, user_id: i64, data: &RemnawaveLinkData) -> Result<RemnawaveLink> {
        sqlx::query_as::<_, RemnawaveLink>(
            r#"
            INSERT INTO remnawave_links
                (user_id, remnawave_uuid, short_uuid, username, status, subscription_url,
                 traffic_limit_bytes, used_traffic_bytes, expire_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(data.remnawave_uuid)
        .bind(data.short_uuid.as_deref())
        .bind(&data.username)
        .bind(&data.status)
        .bind(data.subscription_url.as_deref())
        .bind(data.traffic_limit_bytes)
        .bind(data.used_traffic_bytes)
        .bind(data.expire_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert Remnawave link")
    }

    pub async fn update(&self, user_id: i64, data: &RemnawaveLinkData) -> Result<Option<RemnawaveLink>> {
        sqlx::query_as::<_, RemnawaveLink>(
            r#"
            UPDATE remnawave_links SET
                user_id = $1,
                short_uuid = $3,
                username = $4,
                status = $5,
                subscription_url = $6,
                traffic_limit_bytes = $7,
                used_traffic_bytes = $8,
                expire_at = $9,
                last_synced_at = CURRENT_TIMESTAMP
            WHERE remnawave_uuid = $2
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(data.remnawave_uuid)
        .bind(data.short_uuid.as_deref())
        .bind(&data.username)
        .bind(&data.status)
        .bind(data.subscription_url.as_deref())
        .bind(data.traffic_limit_bytes)
        .bind(data.used_traffic_bytes)
        .bind(data.expire_at)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update Remnawave link")
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM remnawave_links WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete Remnawave link")?;
        Ok(res.rows_affected() > 0)
    }
}
