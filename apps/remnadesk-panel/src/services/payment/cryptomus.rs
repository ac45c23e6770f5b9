use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use serde_json::{Value, json};

use super::{Invoice, PaymentAdapter, WebhookEvent, WebhookOutcome, format_amount, order_id};

const API_URL: &str = "https://api.cryptomus.com/v1/payment";

pub struct CryptomusAdapter {
    http: reqwest::Client,
    merchant_id: String,
    api_key: String,
    callback_url: String,
    return_url: String,
}

impl CryptomusAdapter {
    pub fn new(http: reqwest::Client, merchant_id: String, api_key: String, public_url: &str) -> Self {
        let base = public_url.trim_end_matches('/');
        Self {
            http,
            merchant_id,
            api_key,
            callback_url: format!("{}/api/webhooks/cryptomus", base),
            return_url: base.to_string(),
        }
    }

    fn generate_signature(&self, body: &str) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(body);
        let to_hash = format!("{}{}", encoded, self.api_key);
        format!("{:x}", md5::compute(to_hash.as_bytes()))
    }
}

#[async_trait]
impl PaymentAdapter for CryptomusAdapter {
    async fn create_invoice(&self, invoice: &Invoice) -> Result<String> {
        let body_json = json!({
            "amount": format_amount(invoice.total),
            "currency": invoice.currency,
            "order_id": invoice.payment_id.to_string(),
            "url_callback": self.callback_url,
            "url_return": self.return_url,
            "additional_data": invoice.description,
        });

        let body_str = serde_json::to_string(&body_json)?;
        let sign = self.generate_signature(&body_str);

        let resp_json: Value = self
            .http
            .post(API_URL)
            .header("merchant", &self.merchant_id)
            .header("sign", sign)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await?
            .json()
            .await?;

        resp_json
            .get("result")
            .and_then(|r| r.get("url"))
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Cryptomus Error: {:?}", resp_json))
    }

    fn verify_signature(&self, payload: &str, signature: Option<&str>) -> Result<()> {
        let sig = signature.ok_or_else(|| anyhow::anyhow!("Missing sign header for Cryptomus"))?;
        if sig.eq_ignore_ascii_case(&self.generate_signature(payload)) {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Invalid Cryptomus signature"))
        }
    }

    fn parse_webhook(&self, payload: &str) -> Result<WebhookEvent> {
        let body: Value = serde_json::from_str(payload)?;
        let outcome = match body.get("status").and_then(|s| s.as_str()).unwrap_or_default() {
            "paid" | "paid_over" => WebhookOutcome::Paid,
            "fail" | "cancel" | "system_fail" => WebhookOutcome::Failed,
            _ => WebhookOutcome::Pending,
        };
        Ok(WebhookEvent {
            payment_id: order_id(&body)?,
            outcome,
            external_id: body.get("uuid").and_then(|u| u.as_str()).map(str::to_string),
        })
    }

    fn signature_header(&self) -> &'static str {
        "sign"
    }

    fn name(&self) -> &str {
        "cryptomus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> CryptomusAdapter {
        CryptomusAdapter::new(reqwest::Client::new(), "merchant".into(), "secret".into(), "https://panel.test/")
    }

    #[test]
    fn signature_is_md5_of_base64_body_and_key() {
        let a = adapter();
        let body = r#"{"order_id":"1"}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(body);
        let expected = format!("{:x}", md5::compute(format!("{}secret", encoded)));

        assert!(a.verify_signature(body, Some(&expected)).is_ok());
        assert!(a.verify_signature(body, Some("deadbeef")).is_err());
        assert!(a.verify_signature(body, None).is_err());
    }

    #[test]
    fn callback_points_at_webhook_route() {
        assert_eq!(adapter().callback_url, "https://panel.test/api/webhooks/cryptomus");
    }

    #[test]
    fn maps_statuses() {
        let a = adapter();
        let paid = a
            .parse_webhook(r#"{"order_id":"15","status":"paid_over","uuid":"abc"}"#)
            .unwrap();
        assert_eq!(paid.payment_id, 15);
        assert_eq!(paid.outcome, WebhookOutcome::Paid);
        assert_eq!(paid.external_id.as_deref(), Some("abc"));

        let failed = a.parse_webhook(r#"{"order_id":"15","status":"cancel"}"#).unwrap();
        assert_eq!(failed.outcome, WebhookOutcome::Failed);

        let waiting = a.parse_webhook(r#"{"order_id":"15","status":"check"}"#).unwrap();
        assert_eq!(waiting.outcome, WebhookOutcome::Pending);
    }
}
