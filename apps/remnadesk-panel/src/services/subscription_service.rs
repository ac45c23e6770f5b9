use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use remnadesk_db::models::plan::Plan;
use remnadesk_db::models::subscription::{Subscription, SubscriptionStatus, SubscriptionWithPlan};
use remnadesk_db::repositories::plan_repo::PlanRepository;
use remnadesk_db::repositories::subscription_repo::SubscriptionRepository;
use remnadesk_db::repositories::user_repo::UserRepository;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};

use super::remnawave_sync_service::RemnawaveSyncService;
use crate::error::{AppError, AppResult};

pub const MAX_EXTEND_DAYS: i32 = 3650;

/// New expiry when adding `days`: counted from now if already lapsed.
pub fn extended_expiry(now: DateTime<Utc>, current: DateTime<Utc>, days: i32) -> DateTime<Utc> {
    current.max(now) + Duration::days(i64::from(days))
}

fn check_days(days: i32) -> AppResult<()> {
    if !(1..=MAX_EXTEND_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_EXTEND_DAYS
        )));
    }
    Ok(())
}

pub struct SubscriptionService {
    pool: PgPool,
    subscriptions: SubscriptionRepository,
    plans: PlanRepository,
    users: UserRepository,
    remnawave: Arc<RemnawaveSyncService>,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, remnawave: Arc<RemnawaveSyncService>) -> Self {
        Self {
            subscriptions: SubscriptionRepository::new(pool.clone()),
            plans: PlanRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            pool,
            remnawave,
        }
    }

    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<SubscriptionWithPlan>> {
        Ok(self.subscriptions.get_all_by_user(user_id).await?)
    }

    /// Extends the user's active subscription on `plan` by `days`, or starts a
    /// new one. Runs inside the caller's transaction.
    pub async fn activate_in_tx(
        conn: &mut PgConnection,
        user_id: i64,
        plan: &Plan,
        days: i32,
    ) -> AppResult<Subscription> {
        let now = Utc::now();
        let current = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE user_id = $1 AND plan_id = $2 AND status = 'active'
            ORDER BY expires_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(plan.id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load active subscription")?;

        let sub = match current {
            Some(sub) => sqlx::query_as::<_, Subscription>(
                "UPDATE subscriptions SET expires_at = $2 WHERE id = $1 RETURNING *",
            )
            .bind(sub.id)
            .bind(extended_expiry(now, sub.expires_at, days))
            .fetch_one(&mut *conn)
            .await
            .context("Failed to extend subscription")?,
            None => sqlx::query_as::<_, Subscription>(
                r#"
                INSERT INTO subscriptions (user_id, plan_id, status, started_at, expires_at)
                VALUES ($1, $2, 'active', $3, $4)
                RETURNING *
                "#,
            )
            .bind(user_id)
            .bind(plan.id)
            .bind(now)
            .bind(now + Duration::days(i64::from(days)))
            .fetch_one(&mut *conn)
            .await
            .context("Failed to create subscription")?,
        };
        Ok(sub)
    }

    /// Pushes the subscription to Remnawave. Failures are logged; the local
    /// subscription stays valid and the next sync picks it up.
    pub async fn provision(&self, sub: &Subscription, plan: &Plan) {
        if !self.remnawave.is_configured() {
            return;
        }
        if let Err(e) = self.remnawave.provision(sub, plan).await {
            warn!("Remnawave provisioning failed for subscription {}: {:#}", sub.id, e);
        }
    }

    /// Admin gift: activates `plan_id` for `days` (plan duration by default).
    pub async fn grant(&self, user_id: i64, plan_id: i64, days: Option<i32>) -> AppResult<Subscription> {
        if self.users.get_by_id(user_id).await?.is_none() {
            return Err(AppError::not_found("User"));
        }
        let plan = self
            .plans
            .get_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::not_found("Plan"))?;
        let days = days.unwrap_or(plan.duration_days);
        check_days(days)?;

        let mut tx = self.pool.begin().await?;
        let sub = Self::activate_in_tx(&mut *tx, user_id, &plan, days).await?;
        tx.commit().await?;

        info!("Granted plan {} to user {} for {} days", plan.id, user_id, days);
        self.provision(&sub, &plan).await;
        Ok(sub)
    }

    pub async fn extend(&self, id: i64, days: i32) -> AppResult<Subscription> {
        check_days(days)?;

        let mut tx = self.pool.begin().await?;
        let sub = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock subscription")?
            .ok_or_else(|| AppError::not_found("Subscription"))?;

        if sub.status == SubscriptionStatus::Cancelled.as_str() {
            return Err(AppError::Conflict("Cancelled subscriptions cannot be extended".into()));
        }

        let expires_at = extended_expiry(Utc::now(), sub.expires_at, days);
        let sub = sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions SET expires_at = $2, status = 'active' WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to extend subscription")?;
        tx.commit().await?;

        if let Some(plan) = self.plans.get_by_id(sub.plan_id).await? {
            self.provision(&sub, &plan).await;
        }
        Ok(sub)
    }

    pub async fn cancel(&self, id: i64) -> AppResult<Subscription> {
        let sub = self
            .subscriptions
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Subscription"))?;
        if sub.status != SubscriptionStatus::Active.as_str() {
            return Err(AppError::Conflict(format!("Subscription is already {}", sub.status)));
        }

        let sub = self
            .subscriptions
            .set_status(id, SubscriptionStatus::Cancelled.as_str())
            .await?
            .ok_or_else(|| AppError::not_found("Subscription"))?;

        if let Err(e) = self.remnawave.disable(&sub).await {
            warn!("Failed to disable Remnawave user for subscription {}: {:#}", id, e);
        }
        Ok(sub)
    }

    pub async fn sweep_expired(&self) -> AppResult<u64> {
        let expired = self.subscriptions.expire_due(Utc::now()).await?;
        if expired > 0 {
            info!("Expired {} subscriptions", expired);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn extends_from_current_expiry_when_still_running() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let current = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        let next = extended_expiry(now, current, 30);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 4, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn extends_from_now_when_lapsed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let lapsed = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(extended_expiry(now, lapsed, 7), now + Duration::days(7));
    }

    #[test]
    fn day_bounds() {
        assert!(check_days(0).is_err());
        assert!(check_days(MAX_EXTEND_DAYS + 1).is_err());
        assert!(check_days(30).is_ok());
    }
}
