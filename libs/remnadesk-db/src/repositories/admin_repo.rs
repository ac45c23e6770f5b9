use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};

use crate::models::admin::Admin;

#[derive(Debug, Clone)]
pub struct AdminRepository {
    pool: PgPool,
}

impl AdminRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<Admin>> {
        sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch admin by username")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Admin>> {
        sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch admin by ID")
    }

    pub async fn list(&self) -> Result<Vec<Admin>> {
        sqlx::query_as::<_, Admin>("SELECT * FROM admins ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch admins")
    }

    pub async fn create(&self, username: &str, password_hash: &str, role: &str) -> Result<Admin> {
        sqlx::query_as::<_, Admin>(
            "INSERT INTO admins (username, password_hash, role) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create admin")
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admins WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check admin username")
    }

    /// Locks and returns the admin row for the rest of the transaction.
    pub async fn lock(conn: &mut PgConnection, id: i64) -> Result<Option<Admin>> {
        sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to lock admin")
    }

    /// Locks every active superadmin row and returns how many there are.
    /// Concurrent callers wait on these rows until the holder commits.
    pub async fn lock_active_superadmins(conn: &mut PgConnection) -> Result<i64> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM admins WHERE role = 'superadmin' AND is_active = TRUE ORDER BY id FOR UPDATE",
        )
        .fetch_all(conn)
        .await
        .context("Failed to lock superadmins")?;
        Ok(ids.len() as i64)
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: i64,
        role: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Option<Admin>> {
        sqlx::query_as::<_, Admin>(
            "UPDATE admins SET role = COALESCE($2, role), is_active = COALESCE($3, is_active) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(role)
        .bind(is_active)
        .fetch_optional(conn)
        .await
        .context("Failed to update admin")
    }

    pub async fn set_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE admins SET password_hash = $1 WHERE username = $2")
            .bind(password_hash)
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to update admin password")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM admins WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to delete admin")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn touch_login(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE admins SET last_login_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update last login")?;
        Ok(())
    }
}
