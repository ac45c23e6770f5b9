use std::sync::Arc;

use anyhow::Context;
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::referral::{
    LevelCount, MAX_REFERRAL_LEVEL, ReferralDetails, ReferralReward, UserReferralStats,
};
use remnadesk_db::models::user::User;
use remnadesk_db::repositories::user_repo::UserRepository;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::debug;

use super::percent_of;
use crate::error::{AppError, AppResult};
use crate::settings::SettingsService;

#[derive(Debug, FromRow)]
struct LeaderboardRow {
    username: Option<String>,
    full_name: Option<String>,
    referral_count: i64,
    earned: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub username: String,
    pub referral_count: i64,
    pub earned: i64,
    pub medal: Option<&'static str>,
}

/// Hides most of a name for public boards: `alexander` -> `al***r`.
pub fn mask_username(name: &str) -> String {
    let chars: Vec<char> = name.trim().trim_start_matches('@').chars().collect();
    match chars.len() {
        0 => "***".to_string(),
        1..=3 => format!("{}**", chars[0]),
        n => format!("{}{}***{}", chars[0], chars[1], chars[n - 1]),
    }
}

pub fn medal_for(rank: usize) -> Option<&'static str> {
    match rank {
        1 => Some("🥇"),
        2 => Some("🥈"),
        3 => Some("🥉"),
        _ => None,
    }
}

/// Referral rows for a new user: the direct referrer at level 1, then the
/// referrer's own level 1 and 2 referrers shifted one level up. Never the
/// user itself, never the same referrer twice, never beyond level 3.
pub fn plan_chain(user_id: i64, referrer_id: i64, upstream: &[(i64, i16)]) -> Vec<(i64, i16)> {
    let mut chain: Vec<(i64, i16)> = Vec::with_capacity(MAX_REFERRAL_LEVEL as usize);
    let candidates = std::iter::once((referrer_id, 1)).chain(
        upstream
            .iter()
            .map(|&(id, level)| (id, level + 1))
            .filter(|&(_, level)| level <= MAX_REFERRAL_LEVEL),
    );

    for (id, level) in candidates {
        if id == user_id || chain.iter().any(|&(c, _)| c == id) {
            continue;
        }
        if chain.iter().any(|&(_, l)| l == level) {
            continue;
        }
        chain.push((id, level));
    }
    chain
}

pub fn validate_referral_code(code: &str) -> AppResult<String> {
    let code = code.trim();
    if !(4..=32).contains(&code.len()) {
        return Err(AppError::BadRequest("Referral code must be 4 to 32 characters".into()));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::BadRequest(
            "Referral code may contain letters, digits, '_' and '-' only".into(),
        ));
    }
    Ok(code.to_string())
}

#[derive(Debug, Clone)]
pub struct ReferralService {
    pool: PgPool,
    settings: Arc<SettingsService>,
    users: UserRepository,
}

impl ReferralService {
    pub fn new(pool: PgPool, settings: Arc<SettingsService>) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            pool,
            settings,
        }
    }

    /// Inserts the referral chain for a freshly registered user. Runs inside the
    /// registration transaction.
    pub async fn build_chain(conn: &mut PgConnection, user_id: i64, referrer_id: i64) -> AppResult<usize> {
        let upstream: Vec<(i64, i16)> = sqlx::query_as(
            "SELECT referrer_id, level FROM referrals WHERE referred_id = $1 AND level < $2 ORDER BY level ASC",
        )
        .bind(referrer_id)
        .bind(MAX_REFERRAL_LEVEL)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load upstream referrals")?;

        let chain = plan_chain(user_id, referrer_id, &upstream);
        for (referrer, level) in &chain {
            sqlx::query(
                "INSERT INTO referrals (referrer_id, referred_id, level) VALUES ($1, $2, $3)
                 ON CONFLICT (referred_id, level) DO NOTHING",
            )
            .bind(referrer)
            .bind(user_id)
            .bind(level)
            .execute(&mut *conn)
            .await
            .context("Failed to insert referral")?;
        }
        Ok(chain.len())
    }

    /// Credits every upstream referrer of `user_id` for a completed payment.
    /// Runs inside the payment transaction.
    pub async fn distribute_rewards(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        payment_id: i64,
        amount: i64,
    ) -> AppResult<Vec<ReferralReward>> {
        let referrals: Vec<(i64, i64, i16)> = sqlx::query_as(
            "SELECT id, referrer_id, level FROM referrals WHERE referred_id = $1 ORDER BY level ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load referrals for reward")?;

        let mut rewards = Vec::with_capacity(referrals.len());
        for (referral_id, referrer_id, level) in referrals {
            if !(1..=MAX_REFERRAL_LEVEL).contains(&level) {
                continue;
            }
            let percent = self.settings.referral_percent(level).await;
            let reward = percent_of(amount, percent);
            if reward == 0 {
                continue;
            }

            sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
                .bind(reward)
                .bind(referrer_id)
                .execute(&mut *conn)
                .await
                .context("Failed to credit referral reward")?;

            let row = sqlx::query_as::<_, ReferralReward>(
                r#"
                INSERT INTO referral_rewards (referral_id, user_id, source_user_id, payment_id, level, percent, amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(referral_id)
            .bind(referrer_id)
            .bind(user_id)
            .bind(payment_id)
            .bind(level)
            .bind(percent)
            .bind(reward)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to insert referral reward")?;

            debug!("Referral reward L{} {} -> user {}", level, reward, referrer_id);
            rewards.push(row);
        }
        Ok(rewards)
    }

    pub async fn list(&self, level: Option<i16>, page: &Pagination) -> AppResult<Page<ReferralDetails>> {
        if let Some(l) = level {
            if !(1..=MAX_REFERRAL_LEVEL).contains(&l) {
                return Err(AppError::BadRequest("level must be 1, 2 or 3".into()));
            }
        }

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM referrals WHERE ($1::SMALLINT IS NULL OR level = $1)",
        )
        .bind(level)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count referrals")?;

        let rows = sqlx::query_as::<_, ReferralDetails>(
            r#"
            SELECT r.id, r.referrer_id, a.username AS referrer_username,
                   r.referred_id, b.username AS referred_username, r.level,
                   COALESCE((SELECT SUM(rr.amount) FROM referral_rewards rr WHERE rr.referral_id = r.id), 0)::BIGINT AS rewards_total,
                   r.created_at
            FROM referrals r
            JOIN users a ON a.id = r.referrer_id
            JOIN users b ON b.id = r.referred_id
            WHERE ($1::SMALLINT IS NULL OR r.level = $1)
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(level)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch referrals")?;

        Ok(Page::new(rows, total, page))
    }

    pub async fn user_referrals(&self, user_id: i64) -> AppResult<UserReferralStats> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        let levels = sqlx::query_as::<_, LevelCount>(
            r#"
            SELECT l.level::SMALLINT AS level,
                   COUNT(r.id) AS count,
                   COALESCE((
                       SELECT SUM(rr.amount) FROM referral_rewards rr
                       WHERE rr.user_id = $1 AND rr.level = l.level
                   ), 0)::BIGINT AS earned
            FROM generate_series(1, 3) AS l(level)
            LEFT JOIN referrals r ON r.referrer_id = $1 AND r.level = l.level
            GROUP BY l.level
            ORDER BY l.level
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch referral counts")?;

        Ok(UserReferralStats {
            referral_code: user.referral_code,
            total_referrals: levels.iter().map(|l| l.count).sum(),
            total_earned: levels.iter().map(|l| l.earned).sum(),
            levels,
        })
    }

    pub async fn leaderboard(&self, limit: i64) -> AppResult<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, LeaderboardRow>(
            r#"
            SELECT u.username, u.full_name,
                   COUNT(r.id) AS referral_count,
                   COALESCE((SELECT SUM(rr.amount) FROM referral_rewards rr WHERE rr.user_id = u.id), 0)::BIGINT AS earned
            FROM users u
            JOIN referrals r ON r.referrer_id = u.id AND r.level = 1
            GROUP BY u.id
            ORDER BY referral_count DESC, earned DESC, u.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch referral leaderboard")?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let rank = i + 1;
                let name = row.username.or(row.full_name).unwrap_or_default();
                LeaderboardEntry {
                    rank,
                    username: mask_username(&name),
                    referral_count: row.referral_count,
                    earned: row.earned,
                    medal: medal_for(rank),
                }
            })
            .collect())
    }

    pub async fn update_referral_code(&self, user_id: i64, code: &str) -> AppResult<User> {
        let code = validate_referral_code(code)?;
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        if user.referral_code == code {
            return Ok(user);
        }
        if self.users.referral_code_taken(&code).await? {
            return Err(AppError::Conflict(format!("Referral code '{}' is taken", code)));
        }
        self.users.update_referral_code(user_id, &code).await?;
        Ok(User {
            referral_code: code,
            ..user
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_shifts_upstream_levels() {
        // 10 was referred by 20 (L1) and 30 (L2); 40 is at L3 and must fall off.
        let chain = plan_chain(5, 10, &[(20, 1), (30, 2), (40, 3)]);
        assert_eq!(chain, vec![(10, 1), (20, 2), (30, 3)]);
    }

    #[test]
    fn chain_without_upstream() {
        assert_eq!(plan_chain(5, 10, &[]), vec![(10, 1)]);
    }

    #[test]
    fn chain_never_contains_self_or_repeats() {
        assert!(plan_chain(5, 5, &[]).is_empty());
        let chain = plan_chain(5, 10, &[(5, 1), (10, 2)]);
        assert_eq!(chain, vec![(10, 1)]);
    }

    #[test]
    fn masks_names() {
        assert_eq!(mask_username("alexander"), "al***r");
        assert_eq!(mask_username("@bob"), "b**");
        assert_eq!(mask_username("bobby"), "bo***y");
        assert_eq!(mask_username(""), "***");
        assert_eq!(mask_username("Юлиана"), "Юл***а");
    }

    #[test]
    fn medals_for_podium_only() {
        assert_eq!(medal_for(1), Some("🥇"));
        assert_eq!(medal_for(3), Some("🥉"));
        assert_eq!(medal_for(4), None);
    }

    #[test]
    fn referral_code_rules() {
        assert_eq!(validate_referral_code(" vpn_2026 ").unwrap(), "vpn_2026");
        assert!(validate_referral_code("abc").is_err());
        assert!(validate_referral_code("has space").is_err());
        assert!(validate_referral_code(&"x".repeat(33)).is_err());
    }
}
