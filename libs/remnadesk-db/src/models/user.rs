use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub tg_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub balance: i64,
    pub referral_code: String,
    pub referrer_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub is_banned: bool,
    pub language_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.full_name.clone())
            .unwrap_or_else(|| format!("user{}", self.tg_id))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub language_code: Option<String>,
    pub is_banned: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub q: Option<String>,
    pub banned: Option<bool>,
}
