use anyhow::{Context, Result};
use remnadesk_db::models::activity::ActivityEntry;
use remnadesk_db::models::page::{Page, Pagination};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::auth::AdminClaims;

/// Writes and reads the admin audit trail in `activity_log`.
#[derive(Debug, Clone)]
pub struct LoggingService {
    pool: PgPool,
}

impl LoggingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records an admin action. A failed write is logged, never returned.
    pub async fn admin(&self, actor: &AdminClaims, action: &str, details: impl AsRef<str>) {
        let details = details.as_ref();
        info!(admin = %actor.username, action, "{}", details);
        if let Err(e) = self
            .log_internal(Some(actor.admin_id), action, Some(details), actor.ip.as_deref())
            .await
        {
            warn!("Failed to write activity log for {}: {:#}", action, e);
        }
    }

    pub async fn system(&self, action: &str, details: impl AsRef<str>) {
        let details = details.as_ref();
        info!(action, "{}", details);
        if let Err(e) = self.log_internal(None, action, Some(details), None).await {
            warn!("Failed to write activity log for {}: {:#}", action, e);
        }
    }

    async fn log_internal(
        &self,
        admin_id: Option<i64>,
        action: &str,
        details: Option<&str>,
        ip: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity_log (admin_id, action, details, ip_address) VALUES ($1, $2, $3, $4)",
        )
        .bind(admin_id)
        .bind(action)
        .bind(details)
        .bind(ip)
        .execute(&self.pool)
        .await
        .context("Failed to insert activity log")?;
        Ok(())
    }

    pub async fn list(&self, action: Option<&str>, page: &Pagination) -> Result<Page<ActivityEntry>> {
        let action = action.map(str::trim).filter(|a| !a.is_empty());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activity_log WHERE ($1::TEXT IS NULL OR action = $1)",
        )
        .bind(action)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count activity log")?;

        let rows = sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT l.id, l.admin_id, a.username AS admin_username, l.action, l.details,
                   l.ip_address, l.created_at
            FROM activity_log l
            LEFT JOIN admins a ON a.id = l.admin_id
            WHERE ($1::TEXT IS NULL OR l.action = $1)
            ORDER BY l.created_at DESC, l.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(action)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch activity log")?;

        Ok(Page::new(rows, total, page))
    }

    pub async fn actions(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT action FROM activity_log ORDER BY action")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch log actions")
    }
}
