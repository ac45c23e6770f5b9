use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

text_enum!(PartnerStatus, "partner status", {
    Active => "active",
    Suspended => "suspended",
});

text_enum!(PayoutStatus, "payout status", {
    Pending => "pending",
    Completed => "completed",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Partner {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub commission_percent: Option<f64>,
    pub balance: i64,
    pub total_earned: i64,
    pub total_paid: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Partner {
    pub fn is_active(&self) -> bool {
        self.status == PartnerStatus::Active.as_str()
    }
}

/// Partner row joined with its user and referred-user count for admin lists.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PartnerSummary {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub tg_id: i64,
    pub code: String,
    pub commission_percent: Option<f64>,
    pub balance: i64,
    pub total_earned: i64,
    pub total_paid: i64,
    pub status: String,
    pub referred_users: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PartnerEarning {
    pub id: i64,
    pub partner_id: i64,
    pub user_id: i64,
    pub payment_id: Option<i64>,
    pub source_amount: i64,
    pub percent: f64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PartnerPayout {
    pub id: i64,
    pub partner_id: i64,
    pub amount: i64,
    pub method: String,
    pub destination: String,
    pub status: String,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct PartnerStats {
    pub partners: i64,
    pub active_partners: i64,
    pub outstanding_balance: i64,
    pub pending_payouts: i64,
    pub pending_payout_amount: i64,
    pub total_earned: i64,
    pub total_paid: i64,
}
