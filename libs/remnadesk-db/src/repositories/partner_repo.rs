use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::page::{Pagination, like_pattern};
use crate::models::partner::{
    Partner, PartnerEarning, PartnerPayout, PartnerStats, PartnerSummary,
};

#[derive(Debug, Clone)]
pub struct PartnerRepository {
    pool: PgPool,
}

impl PartnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Partner>> {
        sqlx::query_as::<_, Partner>("SELECT * FROM partners WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch partner by ID")
    }

    pub async fn get_by_user(&self, user_id: i64) -> Result<Option<Partner>> {
        sqlx::query_as::<_, Partner>("SELECT * FROM partners WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch partner by user")
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<Partner>> {
        sqlx::query_as::<_, Partner>("SELECT * FROM partners WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch partner by code")
    }

    pub async fn create(&self, user_id: i64, code: &str, commission_percent: Option<f64>) -> Result<Partner> {
        sqlx::query_as::<_, Partner>(
            "INSERT INTO partners (user_id, code, commission_percent) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user_id)
        .bind(code)
        .bind(commission_percent)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create partner")
    }

    pub async fn list(
        &self,
        query: Option<&str>,
        status: Option<&str>,
        page: &Pagination,
    ) -> Result<(Vec<PartnerSummary>, i64)> {
        let pattern = like_pattern(query);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM partners p
            JOIN users u ON u.id = p.user_id
            WHERE ($1::TEXT IS NULL OR p.code ILIKE $1 OR u.username ILIKE $1)
              AND ($2::TEXT IS NULL OR p.status = $2)
            "#,
        )
        .bind(&pattern)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count partners")?;

        let rows = sqlx::query_as::<_, PartnerSummary>(
            r#"
            SELECT p.id, p.user_id, u.username, u.tg_id, p.code, p.commission_percent,
                   p.balance, p.total_earned, p.total_paid, p.status,
                   (SELECT COUNT(*) FROM users r WHERE r.partner_id = p.id) AS referred_users,
                   p.created_at
            FROM partners p
            JOIN users u ON u.id = p.user_id
            WHERE ($1::TEXT IS NULL OR p.code ILIKE $1 OR u.username ILIKE $1)
              AND ($2::TEXT IS NULL OR p.status = $2)
            ORDER BY p.total_earned DESC, p.id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&pattern)
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch partners")?;

        Ok((rows, total))
    }

    pub async fn update(
        &self,
        id: i64,
        commission_percent: Option<Option<f64>>,
        status: Option<&str>,
    ) -> Result<Option<Partner>> {
        // Outer None keeps the percent; Some(None) resets it to the global setting.
        let (touch_percent, percent) = match commission_percent {
            Some(p) => (true, p),
            None => (false, None),
        };
        sqlx::query_as::<_, Partner>(
            r#"
            UPDATE partners SET
                commission_percent = CASE WHEN $2 THEN $3 ELSE commission_percent END,
                status = COALESCE($4, status)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(touch_percent)
        .bind(percent)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update partner")
    }

    pub async fn recent_earnings(&self, partner_id: i64, limit: i64) -> Result<Vec<PartnerEarning>> {
        sqlx::query_as::<_, PartnerEarning>(
            "SELECT * FROM partner_earnings WHERE partner_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(partner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch partner earnings")
    }

    pub async fn payouts_for(&self, partner_id: i64, limit: i64) -> Result<Vec<PartnerPayout>> {
        sqlx::query_as::<_, PartnerPayout>(
            "SELECT * FROM partner_payouts WHERE partner_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(partner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch partner payouts")
    }

    pub async fn list_payouts(&self, status: Option<&str>, page: &Pagination) -> Result<(Vec<PartnerPayout>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM partner_payouts WHERE ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count payouts")?;

        let rows = sqlx::query_as::<_, PartnerPayout>(
            r#"
            SELECT * FROM partner_payouts
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY (status = 'pending') DESC, created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch payouts")?;

        Ok((rows, total))
    }

    pub async fn stats(&self) -> Result<PartnerStats> {
        sqlx::query_as::<_, PartnerStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM partners) AS partners,
                (SELECT COUNT(*) FROM partners WHERE status = 'active') AS active_partners,
                (SELECT COALESCE(SUM(balance), 0)::BIGINT FROM partners) AS outstanding_balance,
                (SELECT COUNT(*) FROM partner_payouts WHERE status = 'pending') AS pending_payouts,
                (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM partner_payouts WHERE status = 'pending') AS pending_payout_amount,
                (SELECT COALESCE(SUM(total_earned), 0)::BIGINT FROM partners) AS total_earned,
                (SELECT COALESCE(SUM(total_paid), 0)::BIGINT FROM partners) AS total_paid
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch partner stats")
    }
}
