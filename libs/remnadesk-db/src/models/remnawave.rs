use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Local row tying a user to one account on the Remnawave panel.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RemnawaveLink {
    pub id: i64,
    pub user_id: i64,
    pub remnawave_uuid: Uuid,
    pub short_uuid: Option<String>,
    pub username: String,
    pub status: String,
    pub subscription_url: Option<String>,
    pub traffic_limit_bytes: i64,
    pub used_traffic_bytes: i64,
    pub expire_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fields written on create or refresh of a link.
#[derive(Debug, Clone, PartialEq)]
pub struct RemnawaveLinkData {
    pub remnawave_uuid: Uuid,
    pub short_uuid: Option<String>,
    pub username: String,
    pub status: String,
    pub subscription_url: Option<String>,
    pub traffic_limit_bytes: i64,
    pub used_traffic_bytes: i64,
    pub expire_at: Option<DateTime<Utc>>,
}
