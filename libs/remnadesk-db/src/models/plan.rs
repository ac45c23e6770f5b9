use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub currency: String,
    pub duration_days: i32,
    pub traffic_limit_gb: i32,
    pub device_limit: i32,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn traffic_limit_bytes(&self) -> i64 {
        i64::from(self.traffic_limit_gb.max(0)) * 1_073_741_824
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanInput {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub currency: Option<String>,
    pub duration_days: i32,
    pub traffic_limit_gb: Option<i32>,
    pub device_limit: Option<i32>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}
