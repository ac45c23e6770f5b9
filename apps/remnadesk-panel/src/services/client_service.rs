use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::partner::Partner;
use remnadesk_db::models::referral::UserReferralStats;
use remnadesk_db::models::remnawave::RemnawaveLink;
use remnadesk_db::models::subscription::SubscriptionWithPlan;
use remnadesk_db::models::user::{User, UserFilter, UserUpdate};
use remnadesk_db::repositories::notification_repo::NotificationRepository;
use remnadesk_db::repositories::partner_repo::PartnerRepository;
use remnadesk_db::repositories::remnawave_repo::RemnawaveRepository;
use remnadesk_db::repositories::subscription_repo::SubscriptionRepository;
use remnadesk_db::repositories::user_repo::UserRepository;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use super::generate_code;
use super::referral_service::ReferralService;
use crate::error::{AppError, AppResult};

const REFERRAL_CODE_LEN: usize = 8;
const CODE_ATTEMPTS: usize = 8;

/// Admin view of one user.
#[derive(Debug, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: User,
    pub subscriptions: Vec<SubscriptionWithPlan>,
    pub referrals: UserReferralStats,
    pub partner: Option<Partner>,
    pub remnawave_links: Vec<RemnawaveLink>,
}

#[derive(Debug, Serialize)]
pub struct ActiveSubscription {
    #[serde(flatten)]
    pub subscription: SubscriptionWithPlan,
    pub days_left: i64,
}

/// Client home screen.
#[derive(Debug, Serialize)]
pub struct ClientDashboard {
    pub user: User,
    pub active_subscriptions: Vec<ActiveSubscription>,
    pub unread_notifications: i64,
    pub total_referrals: i64,
    pub referral_earnings: i64,
    pub is_partner: bool,
}

/// Profile fields taken from Telegram on each login.
#[derive(Debug, Clone, Default)]
pub struct TelegramProfile {
    pub tg_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub language_code: Option<String>,
}

/// Where a start code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inviter {
    Partner(i64),
    User(i64),
}

/// Strips the optional `ref_` deep-link prefix.
pub fn normalize_start_code(code: &str) -> Option<&str> {
    let code = code.trim();
    let code = code
        .strip_prefix("ref_")
        .or_else(|| code.strip_prefix("REF_"))
        .unwrap_or(code);
    (!code.is_empty()).then_some(code)
}

#[derive(Debug, Clone)]
pub struct ClientService {
    pool: PgPool,
    users: UserRepository,
    subscriptions: SubscriptionRepository,
    partners: PartnerRepository,
    links: RemnawaveRepository,
    notifications: NotificationRepository,
    referrals: Arc<ReferralService>,
}

impl ClientService {
    pub fn new(pool: PgPool, referrals: Arc<ReferralService>) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool.clone()),
            partners: PartnerRepository::new(pool.clone()),
            links: RemnawaveRepository::new(pool.clone()),
            notifications: NotificationRepository::new(pool.clone()),
            pool,
            referrals,
        }
    }

    pub async fn list(&self, filter: &UserFilter, page: &Pagination) -> AppResult<Page<User>> {
        let (rows, total) = self.users.list(filter, page).await?;
        Ok(Page::new(rows, total, page))
    }

    pub async fn find(&self, id: i64) -> AppResult<User> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn get(&self, id: i64) -> AppResult<UserDetails> {
        let user = self.find(id).await?;
        let subscriptions = self.subscriptions.get_all_by_user(id).await?;
        let referrals = self.referrals.user_referrals(id).await?;
        let partner = self.partners.get_by_user(id).await?;
        let remnawave_links = self.links.links_for_user(id).await?;
        Ok(UserDetails {
            user,
            subscriptions,
            referrals,
            partner,
            remnawave_links,
        })
    }

    pub async fn update(&self, id: i64, patch: &UserUpdate) -> AppResult<User> {
        if let Some(email) = patch.email.as_deref() {
            let email = email.trim();
            if !email.is_empty() && (!email.contains('@') || email.len() > 254) {
                return Err(AppError::BadRequest("Invalid email address".into()));
            }
        }
        self.users
            .update(id, patch)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// Applies a signed balance change; the result may not go negative.
    pub async fn adjust_balance(&self, id: i64, delta: i64, reason: &str) -> AppResult<User> {
        if delta == 0 {
            return Err(AppError::BadRequest("delta must not be zero".into()));
        }
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest("reason is required".into()));
        }

        let mut tx = self.pool.begin().await?;
        let balance: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock user balance")?
            .ok_or_else(|| AppError::not_found("User"))?;

        let new_balance = balance
            .checked_add(delta)
            .ok_or_else(|| AppError::BadRequest("Balance overflow".into()))?;
        if new_balance < 0 {
            return Err(AppError::BadRequest(format!(
                "Balance would become negative ({} + {})",
                balance, delta
            )));
        }

        let user = sqlx::query_as::<_, User>("UPDATE users SET balance = $1 WHERE id = $2 RETURNING *")
            .bind(new_balance)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to update balance")?;
        tx.commit().await?;

        info!("Balance of user {} adjusted by {}: {}", id, delta, reason.trim());
        Ok(user)
    }

    async fn resolve_inviter(&self, code: Option<&str>) -> AppResult<Option<Inviter>> {
        let Some(code) = code.and_then(normalize_start_code) else {
            return Ok(None);
        };
        if let Some(partner) = self.partners.get_by_code(code).await? {
            return Ok(partner.is_active().then_some(Inviter::Partner(partner.id)));
        }
        Ok(self
            .users
            .get_by_referral_code(code)
            .await?
            .map(|u| Inviter::User(u.id)))
    }

    async fn unused_referral_code(&self) -> AppResult<String> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_code("", REFERRAL_CODE_LEN);
            if !self.users.referral_code_taken(&code).await? {
                return Ok(code);
            }
        }
        Err(AppError::Internal(anyhow::anyhow!("Could not allocate a unique referral code")))
    }

    /// Finds the user by Telegram ID or creates it. The start code only applies
    /// on first registration. Returns the user and whether it was created.
    pub async fn register(&self, profile: &TelegramProfile, start_code: Option<&str>) -> AppResult<(User, bool)> {
        if let Some(existing) = self.users.get_by_tg_id(profile.tg_id).await? {
            let user = sqlx::query_as::<_, User>(
                r#"
                UPDATE users SET
                    username = COALESCE($2, username),
                    full_name = COALESCE($3, full_name),
                    language_code = COALESCE(language_code, $4),
                    last_seen = CURRENT_TIMESTAMP
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(existing.id)
            .bind(&profile.username)
            .bind(&profile.full_name)
            .bind(&profile.language_code)
            .fetch_one(&self.pool)
            .await
            .context("Failed to refresh user profile")?;
            return Ok((user, false));
        }

        let inviter = self.resolve_inviter(start_code).await?;
        let referral_code = self.unused_referral_code().await?;
        let (referrer_id, partner_id) = match inviter {
            Some(Inviter::User(id)) => (Some(id), None),
            Some(Inviter::Partner(id)) => (None, Some(id)),
            None => (None, None),
        };

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (tg_id, username, full_name, language_code, referral_code, referrer_id, partner_id, last_seen)
            VALUES ($1, $2, $3, $4, $5, $6, $7, CURRENT_TIMESTAMP)
            ON CONFLICT (tg_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(profile.tg_id)
        .bind(&profile.username)
        .bind(&profile.full_name)
        .bind(&profile.language_code)
        .bind(&referral_code)
        .bind(referrer_id)
        .bind(partner_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to insert user")?;

        let Some(user) = inserted else {
            // Lost a race with a concurrent login for the same Telegram ID.
            tx.rollback().await?;
            let user = self
                .users
                .get_by_tg_id(profile.tg_id)
                .await?
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("User vanished during registration")))?;
            return Ok((user, false));
        };

        if let Some(referrer) = referrer_id {
            ReferralService::build_chain(&mut *tx, user.id, referrer).await?;
        }
        tx.commit().await?;

        info!(
            "Registered user {} (tg {}), inviter: {:?}",
            user.id, user.tg_id, inviter
        );
        Ok((user, true))
    }

    pub async fn dashboard(&self, user_id: i64) -> AppResult<ClientDashboard> {
        let user = self.find(user_id).await?;
        let now = Utc::now();
        let active_subscriptions = self
            .subscriptions
            .get_all_by_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.status == "active" && s.expires_at > now)
            .map(|s| ActiveSubscription {
                days_left: s.days_left(now),
                subscription: s,
            })
            .collect();
        let unread_notifications = self.notifications.unread_count(user_id).await?;
        let referrals = self.referrals.user_referrals(user_id).await?;
        let is_partner = self.partners.get_by_user(user_id).await?.is_some();

        Ok(ClientDashboard {
            user,
            active_subscriptions,
            unread_notifications,
            total_referrals: referrals.total_referrals,
            referral_earnings: referrals.total_earned,
            is_partner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_codes_lose_ref_prefix() {
        assert_eq!(normalize_start_code("ref_ABC123"), Some("ABC123"));
        assert_eq!(normalize_start_code(" PXYZ1234 "), Some("PXYZ1234"));
        assert_eq!(normalize_start_code("ref_"), None);
        assert_eq!(normalize_start_code(""), None);
    }
}
