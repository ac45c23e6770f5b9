use anyhow::Result;
use async_trait::async_trait;
use remnadesk_db::models::gateway::{Gateway, GatewayProvider};
use serde_json::Value;

pub mod cryptomus;
pub mod placeholder;

use cryptomus::CryptomusAdapter;
use placeholder::PlaceholderAdapter;

/// What the adapter needs to open a checkout for one payment.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub payment_id: i64,
    /// Plan price plus gateway fee, in cents.
    pub total: i64,
    pub currency: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Paid,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub payment_id: i64,
    pub outcome: WebhookOutcome,
    pub external_id: Option<String>,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create an invoice and return the payment URL
    async fn create_invoice(&self, invoice: &Invoice) -> Result<String>;

    /// Verify the webhook signature
    fn verify_signature(&self, payload: &str, signature: Option<&str>) -> Result<()>;

    /// Decode a verified webhook body
    fn parse_webhook(&self, payload: &str) -> Result<WebhookEvent>;

    /// Header carrying the webhook signature
    fn signature_header(&self) -> &'static str;

    fn name(&self) -> &str;
}

pub fn adapter_for(gateway: &Gateway, public_url: &str, http: reqwest::Client) -> Result<Box<dyn PaymentAdapter>> {
    match gateway.provider() {
        GatewayProvider::Cryptomus => {
            let merchant_id = gateway
                .config_str("merchant_id")
                .ok_or_else(|| anyhow::anyhow!("Gateway {} has no merchant_id", gateway.id))?;
            let api_key = gateway
                .config_str("api_key")
                .ok_or_else(|| anyhow::anyhow!("Gateway {} has no api_key", gateway.id))?;
            Ok(Box::new(CryptomusAdapter::new(
                http,
                merchant_id.to_string(),
                api_key.to_string(),
                public_url,
            )))
        }
        _ => Ok(Box::new(PlaceholderAdapter::new(
            public_url,
            gateway.config_str("webhook_secret").map(str::to_string),
        ))),
    }
}

/// `order_id` may arrive as a string or a number.
pub(crate) fn order_id(body: &Value) -> Result<i64> {
    let id = match body.get("order_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    id.ok_or_else(|| anyhow::anyhow!("Webhook has no usable order_id"))
}

/// Cents to a decimal string, `1234` -> `"12.34"`.
pub(crate) fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway_service::test_gateway;
    use serde_json::json;

    #[test]
    fn amounts_render_with_two_decimals() {
        assert_eq!(format_amount(1234), "12.34");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(100), "1.00");
    }

    #[test]
    fn order_id_accepts_string_or_number() {
        assert_eq!(order_id(&json!({"order_id": "42"})).unwrap(), 42);
        assert_eq!(order_id(&json!({"order_id": 7})).unwrap(), 7);
        assert!(order_id(&json!({"order_id": "abc"})).is_err());
        assert!(order_id(&json!({})).is_err());
    }

    #[test]
    fn picks_adapter_by_provider() {
        let http = reqwest::Client::new();
        let crypto = test_gateway("cryptomus", json!({"merchant_id": "m", "api_key": "k"}));
        assert_eq!(adapter_for(&crypto, "https://panel.test", http.clone()).unwrap().name(), "cryptomus");

        let stripe = test_gateway("stripe", json!({}));
        assert_eq!(adapter_for(&stripe, "https://panel.test", http.clone()).unwrap().name(), "placeholder");

        let broken = test_gateway("cryptomus", json!({}));
        assert!(adapter_for(&broken, "https://panel.test", http).is_err());
    }
}
