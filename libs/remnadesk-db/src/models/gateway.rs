use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

text_enum!(GatewayProvider, "gateway provider", {
    Stripe => "stripe",
    Paypal => "paypal",
    Cryptomus => "cryptomus",
    Yookassa => "yookassa",
    Custom => "custom",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Gateway {
    pub id: i64,
    pub name: String,
    pub provider: String,
    pub currency: String,
    pub fee_percent: f64,
    pub fee_fixed: i64,
    pub min_amount: i64,
    pub max_amount: Option<i64>,
    /// Provider credentials; never sent to clients.
    #[serde(skip_serializing)]
    pub config: serde_json::Value,
    pub is_active: bool,
    pub is_default: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gateway {
    pub fn provider(&self) -> GatewayProvider {
        self.provider.parse().unwrap_or(GatewayProvider::Custom)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Admin view that includes which config keys are set, without values.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayAdminView {
    #[serde(flatten)]
    pub gateway: Gateway,
    pub config_keys: Vec<String>,
}

impl From<Gateway> for GatewayAdminView {
    fn from(gateway: Gateway) -> Self {
        let config_keys = gateway
            .config
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            gateway,
            config_keys,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInput {
    pub name: String,
    pub provider: String,
    pub currency: Option<String>,
    pub fee_percent: Option<f64>,
    pub fee_fixed: Option<i64>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub config: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}
