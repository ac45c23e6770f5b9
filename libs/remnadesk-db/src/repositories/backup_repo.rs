use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::backup::Backup;
use crate::models::page::Pagination;

#[derive(Debug, Clone)]
pub struct BackupRepository {
    pool: PgPool,
}

impl BackupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        filename: &str,
        size_bytes: i64,
        kind: &str,
        status: &str,
        error: Option<&str>,
        created_by: Option<i64>,
    ) -> Result<Backup> {
        sqlx::query_as::<_, Backup>(
            r#"
            INSERT INTO backups (filename, size_bytes, kind, status, error, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(filename)
        .bind(size_bytes)
        .bind(kind)
        .bind(status)
        .bind(error)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .context("Failed to record backup")
    }

    pub async fn list(&self, page: &Pagination) -> Result<(Vec<Backup>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM backups")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count backups")?;

        let rows = sqlx::query_as::<_, Backup>(
            "SELECT * FROM backups ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch backups")?;

        Ok((rows, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Backup>> {
        sqlx::query_as::<_, Backup>("SELECT * FROM backups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch backup by ID")
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM backups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete backup")?;
        Ok(res.rows_affected() > 0)
    }
}
