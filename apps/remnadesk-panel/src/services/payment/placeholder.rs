use anyhow::Result;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use super::{Invoice, PaymentAdapter, WebhookEvent, WebhookOutcome, order_id};

type HmacSha256 = Hmac<Sha256>;

/// Providers without a live integration. The checkout URL points back at the
/// panel; webhooks are signed with HMAC-SHA256 over the raw body using the
/// gateway's `webhook_secret`.
pub struct PlaceholderAdapter {
    base_url: String,
    webhook_secret: Option<String>,
}

impl PlaceholderAdapter {
    pub fn new(public_url: &str, webhook_secret: Option<String>) -> Self {
        Self {
            base_url: public_url.trim_end_matches('/').to_string(),
            webhook_secret,
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Gateway has no webhook_secret"))?;
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| anyhow::anyhow!("Invalid webhook secret: {}", e))
    }
}

#[async_trait]
impl PaymentAdapter for PlaceholderAdapter {
    async fn create_invoice(&self, invoice: &Invoice) -> Result<String> {
        Ok(format!("{}/pay/{}", self.base_url, invoice.payment_id))
    }

    fn verify_signature(&self, payload: &str, signature: Option<&str>) -> Result<()> {
        let sig = signature.ok_or_else(|| anyhow::anyhow!("Missing X-Signature header"))?;
        let sig = hex::decode(sig.trim()).map_err(|_| anyhow::anyhow!("Signature is not hex"))?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| anyhow::anyhow!("Invalid webhook signature"))
    }

    fn parse_webhook(&self, payload: &str) -> Result<WebhookEvent> {
        let body: Value = serde_json::from_str(payload)?;
        let outcome = match body.get("status").and_then(|s| s.as_str()).unwrap_or_default() {
            "paid" | "succeeded" | "completed" => WebhookOutcome::Paid,
            "failed" | "cancelled" | "canceled" => WebhookOutcome::Failed,
            _ => WebhookOutcome::Pending,
        };
        Ok(WebhookEvent {
            payment_id: order_id(&body)?,
            outcome,
            external_id: body
                .get("external_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    fn signature_header(&self) -> &'static str {
        "x-signature"
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkout_url_points_at_panel() {
        let a = PlaceholderAdapter::new("https://panel.test/", None);
        let invoice = Invoice {
            payment_id: 77,
            total: 1000,
            currency: "USD".into(),
            description: "Monthly".into(),
        };
        assert_eq!(a.create_invoice(&invoice).await.unwrap(), "https://panel.test/pay/77");
    }

    #[test]
    fn verifies_hmac() {
        let a = PlaceholderAdapter::new("https://panel.test", Some("whsec".into()));
        let body = r#"{"order_id":9,"status":"paid"}"#;
        assert!(a.verify_signature(body, Some(&sign("whsec", body))).is_ok());
        assert!(a.verify_signature(body, Some(&sign("other", body))).is_err());
        assert!(a.verify_signature(body, Some("zz")).is_err());
    }

    #[test]
    fn rejects_everything_without_secret() {
        let a = PlaceholderAdapter::new("https://panel.test", None);
        let body = "{}";
        assert!(a.verify_signature(body, Some(&sign("x", body))).is_err());
    }

    #[test]
    fn parses_event() {
        let a = PlaceholderAdapter::new("https://panel.test", None);
        let ev = a
            .parse_webhook(r#"{"order_id":"9","status":"succeeded","external_id":"ch_1"}"#)
            .unwrap();
        assert_eq!(ev.payment_id, 9);
        assert_eq!(ev.outcome, WebhookOutcome::Paid);
        assert_eq!(ev.external_id.as_deref(), Some("ch_1"));
    }
}
