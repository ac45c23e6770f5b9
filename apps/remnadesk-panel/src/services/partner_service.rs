use std::sync::Arc;

use anyhow::Context;
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::partner::{
    Partner, PartnerEarning, PartnerPayout, PartnerStats, PartnerStatus, PartnerSummary,
    PayoutStatus,
};
use remnadesk_db::repositories::partner_repo::PartnerRepository;
use remnadesk_db::repositories::user_repo::UserRepository;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use super::{generate_code, is_unique_violation, percent_of, require_non_empty};
use crate::error::{AppError, AppResult};
use crate::settings::SettingsService;

const CODE_ATTEMPTS: usize = 8;
const DETAIL_HISTORY: i64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct PartnerDetails {
    #[serde(flatten)]
    pub partner: Partner,
    pub effective_percent: f64,
    pub recent_earnings: Vec<PartnerEarning>,
    pub payouts: Vec<PartnerPayout>,
}

pub fn validate_percent(percent: f64) -> AppResult<()> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(AppError::BadRequest("commission_percent must be between 0 and 100".into()));
    }
    Ok(())
}

/// Payout preconditions against a locked partner row.
pub fn check_payout(partner: &Partner, amount: i64, min_amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::BadRequest("Payout amount must be positive".into()));
    }
    if !partner.is_active() {
        return Err(AppError::Forbidden("Partner account is suspended".into()));
    }
    if amount < min_amount {
        return Err(AppError::BadRequest(format!(
            "Minimum payout amount is {}",
            min_amount
        )));
    }
    if amount > partner.balance {
        return Err(AppError::BadRequest(format!(
            "Payout amount {} exceeds balance {}",
            amount, partner.balance
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PartnerService {
    pool: PgPool,
    settings: Arc<SettingsService>,
    partners: PartnerRepository,
    users: UserRepository,
}

impl PartnerService {
    pub fn new(pool: PgPool, settings: Arc<SettingsService>) -> Self {
        Self {
            partners: PartnerRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            pool,
            settings,
        }
    }

    async fn unused_code(&self) -> AppResult<String> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_code("P", 7);
            if !self.users.referral_code_taken(&code).await? {
                return Ok(code);
            }
        }
        Err(AppError::Internal(anyhow::anyhow!("Could not allocate a unique partner code")))
    }

    pub async fn enroll(&self, user_id: i64, commission_percent: Option<f64>) -> AppResult<Partner> {
        if let Some(p) = commission_percent {
            validate_percent(p)?;
        }
        if self.users.get_by_id(user_id).await?.is_none() {
            return Err(AppError::not_found("User"));
        }
        if self.partners.get_by_user(user_id).await?.is_some() {
            return Err(AppError::Conflict("User is already a partner".into()));
        }

        let code = self.unused_code().await?;
        let partner = match self.partners.create(user_id, &code, commission_percent).await {
            Ok(partner) => partner,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict("User is already a partner".into()));
            }
            Err(e) => return Err(e.into()),
        };
        info!("User {} enrolled as partner {} ({})", user_id, partner.id, partner.code);
        Ok(partner)
    }

    pub async fn list(
        &self,
        query: Option<&str>,
        status: Option<PartnerStatus>,
        page: &Pagination,
    ) -> AppResult<Page<PartnerSummary>> {
        let (rows, total) = self
            .partners
            .list(query, status.map(|s| s.as_str()), page)
            .await?;
        Ok(Page::new(rows, total, page))
    }

    pub async fn get(&self, id: i64) -> AppResult<PartnerDetails> {
        let partner = self
            .partners
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Partner"))?;
        self.details(partner).await
    }

    pub async fn for_user(&self, user_id: i64) -> AppResult<Option<Partner>> {
        Ok(self.partners.get_by_user(user_id).await?)
    }

    pub async fn details(&self, partner: Partner) -> AppResult<PartnerDetails> {
        let recent_earnings = self.partners.recent_earnings(partner.id, DETAIL_HISTORY).await?;
        let payouts = self.partners.payouts_for(partner.id, DETAIL_HISTORY).await?;
        let effective_percent = match partner.commission_percent {
            Some(p) => p,
            None => self.settings.partner_commission_percent().await,
        };
        Ok(PartnerDetails {
            partner,
            effective_percent,
            recent_earnings,
            payouts,
        })
    }

    pub async fn update(
        &self,
        id: i64,
        commission_percent: Option<Option<f64>>,
        status: Option<PartnerStatus>,
    ) -> AppResult<Partner> {
        if let Some(Some(p)) = commission_percent {
            validate_percent(p)?;
        }
        self.partners
            .update(id, commission_percent, status.map(|s| s.as_str()))
            .await?
            .ok_or_else(|| AppError::not_found("Partner"))
    }

    /// Credits the paying user's partner. Runs inside the payment transaction.
    pub async fn record_earning(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        payment_id: i64,
        amount: i64,
    ) -> AppResult<Option<PartnerEarning>> {
        let partner = sqlx::query_as::<_, Partner>(
            r#"
            SELECT p.* FROM partners p
            JOIN users u ON u.partner_id = p.id
            WHERE u.id = $1
            FOR UPDATE OF p
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load partner for earning")?;

        let Some(partner) = partner else {
            return Ok(None);
        };
        if !partner.is_active() || partner.user_id == user_id {
            return Ok(None);
        }

        let percent = match partner.commission_percent {
            Some(p) => p,
            None => self.settings.partner_commission_percent().await,
        };
        let earned = percent_of(amount, percent);
        if earned == 0 {
            return Ok(None);
        }

        let earning = sqlx::query_as::<_, PartnerEarning>(
            r#"
            INSERT INTO partner_earnings (partner_id, user_id, payment_id, source_amount, percent, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(partner.id)
        .bind(user_id)
        .bind(payment_id)
        .bind(amount)
        .bind(percent)
        .bind(earned)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to insert partner earning")?;

        sqlx::query(
            "UPDATE partners SET balance = balance + $1, total_earned = total_earned + $1 WHERE id = $2",
        )
        .bind(earned)
        .bind(partner.id)
        .execute(&mut *conn)
        .await
        .context("Failed to credit partner")?;

        debug!("Partner {} earned {} from payment {}", partner.id, earned, payment_id);
        Ok(Some(earning))
    }

    /// Deducts the balance up front; a rejected payout refunds it.
    pub async fn request_payout(
        &self,
        partner_id: i64,
        amount: i64,
        method: &str,
        destination: &str,
    ) -> AppResult<PartnerPayout> {
        require_non_empty(method, "method")?;
        require_non_empty(destination, "destination")?;
        let min_amount = self.settings.min_payout_amount().await;

        let mut tx = self.pool.begin().await?;

        let partner = sqlx::query_as::<_, Partner>("SELECT * FROM partners WHERE id = $1 FOR UPDATE")
            .bind(partner_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock partner")?
            .ok_or_else(|| AppError::not_found("Partner"))?;

        check_payout(&partner, amount, min_amount)?;

        sqlx::query("UPDATE partners SET balance = balance - $1 WHERE id = $2")
            .bind(amount)
            .bind(partner_id)
            .execute(&mut *tx)
            .await
            .context("Failed to deduct partner balance")?;

        let payout = sqlx::query_as::<_, PartnerPayout>(
            r#"
            INSERT INTO partner_payouts (partner_id, amount, method, destination)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(partner_id)
        .bind(amount)
        .bind(method.trim())
        .bind(destination.trim())
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert payout")?;

        tx.commit().await?;
        info!("Partner {} requested payout {} of {}", partner_id, payout.id, amount);
        Ok(payout)
    }

    pub async fn complete_payout(&self, id: i64, note: Option<&str>) -> AppResult<PartnerPayout> {
        self.process_payout(id, PayoutStatus::Completed, note).await
    }

    pub async fn reject_payout(&self, id: i64, note: Option<&str>) -> AppResult<PartnerPayout> {
        self.process_payout(id, PayoutStatus::Rejected, note).await
    }

    async fn process_payout(&self, id: i64, to: PayoutStatus, note: Option<&str>) -> AppResult<PartnerPayout> {
        let mut tx = self.pool.begin().await?;

        let payout = sqlx::query_as::<_, PartnerPayout>(
            "SELECT * FROM partner_payouts WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock payout")?
        .ok_or_else(|| AppError::not_found("Payout"))?;

        if payout.status != PayoutStatus::Pending.as_str() {
            return Err(AppError::Conflict(format!(
                "Payout {} is already {}",
                id, payout.status
            )));
        }

        let adjust = match to {
            PayoutStatus::Completed => "UPDATE partners SET total_paid = total_paid + $1 WHERE id = $2",
            PayoutStatus::Rejected => "UPDATE partners SET balance = balance + $1 WHERE id = $2",
            PayoutStatus::Pending => {
                return Err(AppError::BadRequest("Cannot move a payout back to pending".into()));
            }
        };
        sqlx::query(adjust)
            .bind(payout.amount)
            .bind(payout.partner_id)
            .execute(&mut *tx)
            .await
            .context("Failed to settle partner balance")?;

        let updated = sqlx::query_as::<_, PartnerPayout>(
            r#"
            UPDATE partner_payouts
            SET status = $2, admin_note = $3, processed_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(note.map(str::trim).filter(|n| !n.is_empty()))
        .fetch_one(&mut *tx)
        .await
        .context("Failed to update payout")?;

        tx.commit().await?;
        info!("Payout {} {}", id, to);
        Ok(updated)
    }

    pub async fn list_payouts(&self, status: Option<PayoutStatus>, page: &Pagination) -> AppResult<Page<PartnerPayout>> {
        let (rows, total) = self
            .partners
            .list_payouts(status.map(|s| s.as_str()), page)
            .await?;
        Ok(Page::new(rows, total, page))
    }

    pub async fn stats(&self) -> AppResult<PartnerStats> {
        Ok(self.partners.stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn partner(balance: i64, status: &str) -> Partner {
        Partner {
            id: 1,
            user_id: 10,
            code: "PABCDEFG".into(),
            commission_percent: None,
            balance,
            total_earned: balance,
            total_paid: 0,
            status: status.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn payout_within_balance_and_minimum() {
        assert!(check_payout(&partner(5000, "active"), 1000, 1000).is_ok());
        assert!(check_payout(&partner(5000, "active"), 5000, 1000).is_ok());
    }

    #[test]
    fn payout_never_exceeds_balance() {
        let err = check_payout(&partner(5000, "active"), 5001, 1000).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn payout_rejections() {
        assert!(check_payout(&partner(5000, "active"), 999, 1000).is_err());
        assert!(check_payout(&partner(5000, "active"), 0, 0).is_err());
        assert!(check_payout(&partner(5000, "active"), -10, 0).is_err());
        assert!(matches!(
            check_payout(&partner(5000, "suspended"), 2000, 1000),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn commission_percent_bounds() {
        assert!(validate_percent(0.0).is_ok());
        assert!(validate_percent(100.0).is_ok());
        assert!(validate_percent(100.5).is_err());
        assert!(validate_percent(f64::INFINITY).is_err());
    }

    async fn ledger(state: &crate::state::AppState, id: i64) -> (i64, i64, i64) {
        let p = state.partners.get(id).await.unwrap().partner;
        (p.balance, p.total_earned, p.total_paid)
    }

    #[tokio::test]
    async fn commission_payout_and_refund_keep_the_ledger() {
        use crate::services::fixtures::{pending_payment, register, storefront};

        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let (plan, _) = storefront(&state).await;
        let owner = register(&state, 5001, None).await;
        let partner = state.partners.enroll(owner.id, None).await.unwrap();
        let client = register(&state, 5002, Some(&partner.code)).await;
        assert_eq!(client.partner_id, Some(partner.id));
        assert_eq!(client.referrer_id, None);

        let payment = pending_payment(&state, client.id, &plan).await;
        state.payments.complete_payment(payment.id, None).await.unwrap();
        assert_eq!(ledger(&state, partner.id).await, (2000, 2000, 0));

        let payout = state.partners.request_payout(partner.id, 1500, "card", " 4111 ").await.unwrap();
        assert_eq!(payout.destination, "4111");
        assert_eq!(ledger(&state, partner.id).await, (500, 2000, 0));
        assert!(matches!(
            state.partners.request_payout(partner.id, 1000, "card", "4111").await,
            Err(AppError::BadRequest(_))
        ));

        let rejected = state.partners.reject_payout(payout.id, Some("wrong card")).await.unwrap();
        assert_eq!(rejected.status, "rejected");
        assert_eq!(ledger(&state, partner.id).await, (2000, 2000, 0));
        assert!(matches!(
            state.partners.complete_payout(payout.id, None).await,
            Err(AppError::Conflict(_))
        ));

        let payout = state.partners.request_payout(partner.id, 2000, "card", "4222").await.unwrap();
        state.partners.complete_payout(payout.id, None).await.unwrap();
        assert_eq!(ledger(&state, partner.id).await, (0, 2000, 2000));
        assert!(matches!(
            state.partners.reject_payout(payout.id, None).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_payouts_cannot_overdraw() {
        use crate::services::fixtures::register;

        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let owner = register(&state, 6001, None).await;
        let partner = state.partners.enroll(owner.id, Some(15.0)).await.unwrap();
        sqlx::query("UPDATE partners SET balance = 2000, total_earned = 2000 WHERE id = $1")
            .bind(partner.id)
            .execute(&state.pool)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            state.partners.request_payout(partner.id, 1500, "usdt", "T-wallet"),
            state.partners.request_payout(partner.id, 1500, "usdt", "T-wallet"),
        );
        assert_ne!(first.is_ok(), second.is_ok());
        assert_eq!(ledger(&state, partner.id).await, (500, 2000, 0));
    }

    #[tokio::test]
    async fn concurrent_enrollment_conflicts() {
        use crate::services::fixtures::register;

        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let user = register(&state, 7001, None).await;
        let (first, second) = tokio::join!(
            state.partners.enroll(user.id, None),
            state.partners.enroll(user.id, Some(30.0)),
        );
        assert_ne!(first.is_ok(), second.is_ok());
        let failed = if first.is_ok() { second } else { first };
        assert!(matches!(failed, Err(AppError::Conflict(_))));
        assert!(matches!(state.partners.enroll(user.id, None).await, Err(AppError::Conflict(_))));
        assert!(matches!(state.partners.enroll(user.id + 1000, None).await, Err(AppError::NotFound(_))));
    }
}

