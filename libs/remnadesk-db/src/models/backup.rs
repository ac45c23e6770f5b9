use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

text_enum!(BackupKind, "backup kind", {
    Manual => "manual",
    Scheduled => "scheduled",
});

text_enum!(BackupStatus, "backup status", {
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Backup {
    pub id: i64,
    pub filename: String,
    pub size_bytes: i64,
    pub kind: String,
    pub status: String,
    pub error: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}
