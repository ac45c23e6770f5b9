use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::notification::{Notification, UserNotification};
use crate::models::page::Pagination;

#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        title: &str,
        message: &str,
        kind: &str,
        user_id: Option<i64>,
        created_by: Option<i64>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Notification> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (title, message, kind, user_id, created_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(message)
        .bind(kind)
        .bind(user_id)
        .bind(created_by)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create notification")
    }

    pub async fn list(&self, page: &Pagination) -> Result<(Vec<Notification>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count notifications")?;

        let rows = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch notifications")?;

        Ok((rows, total))
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete notification")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn feed(&self, user_id: i64, limit: i64) -> Result<Vec<UserNotification>> {
        sqlx::query_as::<_, UserNotification>(
            r#"
            SELECT n.id, n.title, n.message, n.kind, n.created_at,
                   (r.notification_id IS NOT NULL) AS is_read
            FROM notifications n
            LEFT JOIN notification_reads r ON r.notification_id = n.id AND r.user_id = $1
            WHERE (n.user_id IS NULL OR n.user_id = $1)
              AND (n.expires_at IS NULL OR n.expires_at > CURRENT_TIMESTAMP)
            ORDER BY n.created_at DESC, n.id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch notification feed")
    }

    /// Returns false when the notification is not visible to this user.
    pub async fn mark_read(&self, notification_id: i64, user_id: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO notification_reads (notification_id, user_id)
            SELECT n.id, $2 FROM notifications n
            WHERE n.id = $1 AND (n.user_id IS NULL OR n.user_id = $2)
            ON CONFLICT (notification_id, user_id) DO NOTHING
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark notification read")?;

        if res.rows_affected() > 0 {
            return Ok(true);
        }

        // Already read counts as success.
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM notification_reads WHERE notification_id = $1 AND user_id = $2)",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check notification read state")
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let res = sqlx::query(
            r#"
            INSERT INTO notification_reads (notification_id, user_id)
            SELECT n.id, $1 FROM notifications n
            WHERE (n.user_id IS NULL OR n.user_id = $1)
              AND (n.expires_at IS NULL OR n.expires_at > CURRENT_TIMESTAMP)
            ON CONFLICT (notification_id, user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark notifications read")?;
        Ok(res.rows_affected())
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications n
            WHERE (n.user_id IS NULL OR n.user_id = $1)
              AND (n.expires_at IS NULL OR n.expires_at > CURRENT_TIMESTAMP)
              AND NOT EXISTS (
                  SELECT 1 FROM notification_reads r WHERE r.notification_id = n.id AND r.user_id = $1
              )
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count unread notifications")
    }
}
