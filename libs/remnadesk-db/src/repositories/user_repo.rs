use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::page::{Pagination, like_pattern};
use crate::models::user::{User, UserFilter, UserUpdate};

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &UserFilter, page: &Pagination) -> Result<(Vec<User>, i64)> {
        let pattern = like_pattern(filter.q.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::TEXT IS NULL OR username ILIKE $1 OR full_name ILIKE $1 OR email ILIKE $1 OR tg_id::TEXT = $2)
              AND ($3::BOOLEAN IS NULL OR is_banned = $3)
            "#,
        )
        .bind(&pattern)
        .bind(filter.q.as_deref().map(str::trim))
        .bind(filter.banned)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count users")?;

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::TEXT IS NULL OR username ILIKE $1 OR full_name ILIKE $1 OR email ILIKE $1 OR tg_id::TEXT = $2)
              AND ($3::BOOLEAN IS NULL OR is_banned = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&pattern)
        .bind(filter.q.as_deref().map(str::trim))
        .bind(filter.banned)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch users")?;

        Ok((users, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by ID")
    }

    pub async fn get_by_tg_id(&self, tg_id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE tg_id = $1")
            .bind(tg_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by TG ID")
    }

    pub async fn get_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by referral code")
    }

    pub async fn update(&self, id: i64, patch: &UserUpdate) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                language_code = COALESCE($3, language_code),
                is_banned = COALESCE($4, is_banned)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.email.as_deref())
        .bind(patch.language_code.as_deref())
        .bind(patch.is_banned)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update user")
    }

    pub async fn update_referral_code(&self, id: i64, code: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE users SET referral_code = $1 WHERE id = $2")
            .bind(code)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update referral code")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn referral_code_taken(&self, code: &str) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = $1)
                 OR EXISTS(SELECT 1 FROM partners WHERE code = $1)",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check referral code")
    }

    pub async fn tg_id_map(&self, tg_ids: &[i64]) -> Result<Vec<(i64, i64)>> {
        sqlx::query_as::<_, (i64, i64)>("SELECT tg_id, id FROM users WHERE tg_id = ANY($1)")
            .bind(tg_ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to map Telegram IDs to users")
    }
}
