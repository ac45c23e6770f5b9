use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

pub const MAX_REFERRAL_LEVEL: i16 = 3;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Referral {
    pub id: i64,
    pub referrer_id: i64,
    pub referred_id: i64,
    pub level: i16,
    pub created_at: DateTime<Utc>,
}

/// Referral row with both usernames for the admin list.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferralDetails {
    pub id: i64,
    pub referrer_id: i64,
    pub referrer_username: Option<String>,
    pub referred_id: i64,
    pub referred_username: Option<String>,
    pub level: i16,
    pub rewards_total: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferralReward {
    pub id: i64,
    pub referral_id: i64,
    pub user_id: i64,
    pub source_user_id: i64,
    pub payment_id: Option<i64>,
    pub level: i16,
    pub percent: f64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LevelCount {
    pub level: i16,
    pub count: i64,
    pub earned: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserReferralStats {
    pub referral_code: String,
    pub levels: Vec<LevelCount>,
    pub total_referrals: i64,
    pub total_earned: i64,
}
