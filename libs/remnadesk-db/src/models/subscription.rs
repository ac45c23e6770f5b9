use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

text_enum!(SubscriptionStatus, "subscription status", {
    Active => "active",
    Expired => "expired",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub traffic_used: i64,
    pub remnawave_uuid: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubscriptionWithPlan {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub plan_name: String,
    pub traffic_limit_gb: i32,
    pub device_limit: i32,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub traffic_used: i64,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionWithPlan {
    pub fn days_left(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days().max(0)
    }
}
