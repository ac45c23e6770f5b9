use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

text_enum!(NotificationKind, "notification kind", {
    Info => "info",
    Warning => "warning",
    Promo => "promo",
    System => "system",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub user_id: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A notification as seen by one client, with its read flag.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserNotification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationInput {
    pub title: String,
    pub message: String,
    pub kind: Option<String>,
    pub user_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}
