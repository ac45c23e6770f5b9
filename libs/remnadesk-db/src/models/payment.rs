use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

text_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub gateway_id: i64,
    pub plan_id: Option<i64>,
    pub amount: i64,
    pub fee: i64,
    pub currency: String,
    pub status: String,
    pub external_id: Option<String>,
    pub payment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        self.status.parse().unwrap_or(PaymentStatus::Failed)
    }

    /// What the customer is charged: plan price plus gateway fee.
    pub fn total(&self) -> i64 {
        self.amount + self.fee
    }
}
