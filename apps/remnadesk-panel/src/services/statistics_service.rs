use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};

pub const MAX_SERIES_DAYS: i32 = 365;
pub const MAX_TOP_PLANS: i64 = 50;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Overview {
    pub users_total: i64,
    pub users_new_today: i64,
    pub users_banned: i64,
    pub active_subscriptions: i64,
    pub revenue_total: i64,
    pub revenue_30d: i64,
    pub completed_payments: i64,
    pub partners_total: i64,
    pub partner_balance_outstanding: i64,
    pub payouts_pending: i64,
    pub referral_rewards_total: i64,
    pub remnawave_links: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SeriesPoint {
    pub day: NaiveDate,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopPlan {
    pub plan_id: i64,
    pub name: String,
    pub sales: i64,
    pub revenue: i64,
}

fn check_days(days: i32) -> AppResult<()> {
    if !(1..=MAX_SERIES_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_SERIES_DAYS
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StatisticsService {
    pool: PgPool,
}

impl StatisticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn overview(&self) -> AppResult<Overview> {
        let overview = sqlx::query_as::<_, Overview>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users_total,
                (SELECT COUNT(*) FROM users WHERE created_at >= CURRENT_DATE) AS users_new_today,
                (SELECT COUNT(*) FROM users WHERE is_banned = TRUE) AS users_banned,
                (SELECT COUNT(*) FROM subscriptions WHERE status = 'active' AND expires_at > CURRENT_TIMESTAMP) AS active_subscriptions,
                (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payments WHERE status = 'completed') AS revenue_total,
                (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payments
                    WHERE status = 'completed' AND completed_at >= CURRENT_TIMESTAMP - INTERVAL '30 days') AS revenue_30d,
                (SELECT COUNT(*) FROM payments WHERE status = 'completed') AS completed_payments,
                (SELECT COUNT(*) FROM partners) AS partners_total,
                (SELECT COALESCE(SUM(balance), 0)::BIGINT FROM partners) AS partner_balance_outstanding,
                (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM partner_payouts WHERE status = 'pending') AS payouts_pending,
                (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM referral_rewards) AS referral_rewards_total,
                (SELECT COUNT(*) FROM remnawave_links) AS remnawave_links
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute overview")?;
        Ok(overview)
    }

    /// Completed revenue per day for the last `days` days, oldest first.
    pub async fn revenue_series(&self, days: i32) -> AppResult<Vec<SeriesPoint>> {
        check_days(days)?;
        let rows = sqlx::query_as::<_, SeriesPoint>(
            r#"
            SELECT d::DATE AS day, COALESCE(SUM(p.amount), 0)::BIGINT AS value
            FROM generate_series(CURRENT_DATE - ($1::INT - 1), CURRENT_DATE, INTERVAL '1 day') AS d
            LEFT JOIN payments p
                ON p.status = 'completed' AND p.completed_at::DATE = d::DATE
            GROUP BY d
            ORDER BY d
            "#,
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute revenue series")?;
        Ok(rows)
    }

    pub async fn registrations_series(&self, days: i32) -> AppResult<Vec<SeriesPoint>> {
        check_days(days)?;
        let rows = sqlx::query_as::<_, SeriesPoint>(
            r#"
            SELECT d::DATE AS day, COUNT(u.id)::BIGINT AS value
            FROM generate_series(CURRENT_DATE - ($1::INT - 1), CURRENT_DATE, INTERVAL '1 day') AS d
            LEFT JOIN users u ON u.created_at::DATE = d::DATE
            GROUP BY d
            ORDER BY d
            "#,
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute registrations series")?;
        Ok(rows)
    }

    /// Plans ranked by completed revenue.
    pub async fn top_plans(&self, limit: i64) -> AppResult<Vec<TopPlan>> {
        let rows = sqlx::query_as::<_, TopPlan>(
            r#"
            SELECT pl.id AS plan_id, pl.name, COUNT(p.id)::BIGINT AS sales, COALESCE(SUM(p.amount), 0)::BIGINT AS revenue
            FROM plans pl
            JOIN payments p ON p.plan_id = pl.id AND p.status = 'completed'
            GROUP BY pl.id, pl.name
            ORDER BY revenue DESC, sales DESC, pl.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, MAX_TOP_PLANS))
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute top plans")?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_window_is_bounded() {
        assert!(check_days(0).is_err());
        assert!(check_days(366).is_err());
        assert!(check_days(1).is_ok());
        assert!(check_days(365).is_ok());
    }
}
