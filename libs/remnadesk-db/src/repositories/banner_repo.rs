use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::banner::{Banner, BannerInput};

#[derive(Debug, Clone)]
pub struct BannerRepository {
    pool: PgPool,
}

impl BannerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Banner>> {
        sqlx::query_as::<_, Banner>("SELECT * FROM banners ORDER BY placement ASC, sort_order ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch banners")
    }

    pub async fn active(&self, placement: Option<&str>) -> Result<Vec<Banner>> {
        sqlx::query_as::<_, Banner>(
            r#"
            SELECT * FROM banners
            WHERE is_active = TRUE
              AND ($1::TEXT IS NULL OR placement = $1)
              AND (starts_at IS NULL OR starts_at <= CURRENT_TIMESTAMP)
              AND (ends_at IS NULL OR ends_at > CURRENT_TIMESTAMP)
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(placement)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch active banners")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Banner>> {
        sqlx::query_as::<_, Banner>("SELECT * FROM banners WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch banner by ID")
    }

    pub async fn create(&self, input: &BannerInput, placement: &str) -> Result<Banner> {
        sqlx::query_as::<_, Banner>(
            r#"
            INSERT INTO banners (title, image_url, link_url, placement, sort_order, is_active, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, 0), COALESCE($6, TRUE), $7, $8)
            RETURNING *
            "#,
        )
        .bind(input.title.trim())
        .bind(input.image_url.trim())
        .bind(input.link_url.as_deref())
        .bind(placement)
        .bind(input.sort_order)
        .bind(input.is_active)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create banner")
    }

    pub async fn update(&self, id: i64, input: &BannerInput, placement: &str) -> Result<Option<Banner>> {
        sqlx::query_as::<_, Banner>(
            r#"
            UPDATE banners SET
                title = $2,
                image_url = $3,
                link_url = $4,
                placement = $5,
                sort_order = COALESCE($6, sort_order),
                is_active = COALESCE($7, is_active),
                starts_at = $8,
                ends_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.title.trim())
        .bind(input.image_url.trim())
        .bind(input.link_url.as_deref())
        .bind(placement)
        .bind(input.sort_order)
        .bind(input.is_active)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update banner")
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM banners WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete banner")?;
        Ok(res.rows_affected() > 0)
    }

    /// Assigns `sort_order` by position. Unknown IDs are ignored.
    pub async fn reorder(&self, ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (position, id) in ids.iter().enumerate() {
            sqlx::query("UPDATE banners SET sort_order = $1 WHERE id = $2")
                .bind(position as i32)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to reorder banners")?;
        }
        tx.commit().await?;
        Ok(())
    }
}
