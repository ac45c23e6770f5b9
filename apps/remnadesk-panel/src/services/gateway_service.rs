use anyhow::Context;
use remnadesk_db::models::gateway::{Gateway, GatewayInput, GatewayProvider};
use remnadesk_db::repositories::gateway_repo::GatewayRepository;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use super::{normalize_currency, require_non_empty};
use crate::error::{AppError, AppResult};

/// Price breakdown for one checkout through a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub amount: i64,
    pub fee: i64,
    pub total: i64,
    pub currency: String,
}

pub fn quote(gateway: &Gateway, amount: i64) -> AppResult<Quote> {
    if amount < gateway.min_amount {
        return Err(AppError::BadRequest(format!(
            "Amount {} is below the gateway minimum of {}",
            amount, gateway.min_amount
        )));
    }
    if let Some(max) = gateway.max_amount
        && amount > max
    {
        return Err(AppError::BadRequest(format!(
            "Amount {} exceeds the gateway maximum of {}",
            amount, max
        )));
    }

    let fee = (amount as f64 * gateway.fee_percent / 100.0).round() as i64 + gateway.fee_fixed;
    Ok(Quote {
        amount,
        fee,
        total: amount + fee,
        currency: gateway.currency.clone(),
    })
}

/// Checks a gateway form; returns the normalized input and parsed provider.
pub fn validate_gateway(input: &GatewayInput) -> AppResult<(GatewayInput, GatewayProvider)> {
    require_non_empty(&input.name, "name")?;
    let provider: GatewayProvider = input.provider.parse()?;

    if let Some(pct) = input.fee_percent
        && !(pct.is_finite() && (0.0..=100.0).contains(&pct))
    {
        return Err(AppError::BadRequest("fee_percent must be between 0 and 100".into()));
    }
    if input.fee_fixed.is_some_and(|f| f < 0) {
        return Err(AppError::BadRequest("fee_fixed must not be negative".into()));
    }
    let min = input.min_amount.unwrap_or(0);
    if min < 0 {
        return Err(AppError::BadRequest("min_amount must not be negative".into()));
    }
    if input.max_amount.is_some_and(|max| max < min) {
        return Err(AppError::BadRequest("max_amount must not be below min_amount".into()));
    }
    if let Some(config) = &input.config
        && !config.is_object()
    {
        return Err(AppError::BadRequest("config must be a JSON object".into()));
    }

    if provider == GatewayProvider::Cryptomus && input.is_active.unwrap_or(true) {
        let has = |key: &str| {
            input
                .config
                .as_ref()
                .and_then(|c| c.get(key))
                .and_then(|v| v.as_str())
                .is_some_and(|v| !v.trim().is_empty())
        };
        if !has("merchant_id") || !has("api_key") {
            return Err(AppError::BadRequest(
                "cryptomus gateways need merchant_id and api_key in config".into(),
            ));
        }
    }

    let mut normalized = input.clone();
    normalized.currency = Some(normalize_currency(input.currency.as_deref())?);
    Ok((normalized, provider))
}

#[derive(Debug, Clone)]
pub struct GatewayService {
    pool: PgPool,
    gateways: GatewayRepository,
}

impl GatewayService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            gateways: GatewayRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn list(&self, include_inactive: bool) -> AppResult<Vec<Gateway>> {
        Ok(self.gateways.list(include_inactive).await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<Gateway> {
        self.gateways
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Gateway"))
    }

    pub async fn default_gateway(&self) -> AppResult<Gateway> {
        self.gateways
            .get_default()
            .await?
            .ok_or_else(|| AppError::BadRequest("No default payment gateway is configured".into()))
    }

    /// Active gateways for `provider`, used to route webhooks.
    pub async fn active_by_provider(&self, provider: GatewayProvider) -> AppResult<Vec<Gateway>> {
        Ok(self.gateways.get_active_by_provider(provider.as_str()).await?)
    }

    pub async fn create(&self, input: &GatewayInput) -> AppResult<Gateway> {
        let (input, provider) = validate_gateway(input)?;
        let gateway = self.gateways.create(&input, provider.as_str()).await?;
        info!("Created gateway {} ({})", gateway.id, gateway.provider);
        Ok(gateway)
    }

    pub async fn update(&self, id: i64, input: &GatewayInput) -> AppResult<Gateway> {
        let current = self.get(id).await?;
        if current.is_default && input.is_active == Some(false) {
            return Err(AppError::Conflict(
                "The default gateway cannot be deactivated; choose another default first".into(),
            ));
        }

        // A partial config update keeps the stored secrets it does not mention.
        let mut merged = input.clone();
        merged.config = match (&input.config, &current.config) {
            (Some(serde_json::Value::Object(patch)), serde_json::Value::Object(stored)) => {
                let mut config = stored.clone();
                config.extend(patch.clone());
                Some(serde_json::Value::Object(config))
            }
            (None, stored) => Some(stored.clone()),
            (Some(other), _) => Some(other.clone()),
        };
        if merged.is_active.is_none() {
            merged.is_active = Some(current.is_active);
        }
        let (input, provider) = validate_gateway(&merged)?;

        self.gateways
            .update(id, &input, provider.as_str())
            .await?
            .ok_or_else(|| AppError::not_found("Gateway"))
    }

    pub async fn delete(&self, id: i64) -> AppResult<Gateway> {
        let gateway = self.get(id).await?;
        if gateway.is_default {
            return Err(AppError::Conflict("The default gateway cannot be deleted".into()));
        }
        let payments = self.gateways.count_payments(id).await?;
        if payments > 0 {
            return Err(AppError::Conflict(format!(
                "Gateway has {} payments; deactivate it instead",
                payments
            )));
        }
        self.gateways.delete(id).await?;
        Ok(gateway)
    }

    pub async fn set_default(&self, id: i64) -> AppResult<Gateway> {
        let mut tx = self.pool.begin().await?;
        let gateway = sqlx::query_as::<_, Gateway>("SELECT * FROM gateways WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock gateway")?
            .ok_or_else(|| AppError::not_found("Gateway"))?;
        if !gateway.is_active {
            return Err(AppError::Conflict("Only an active gateway can be the default".into()));
        }
        if gateway.is_default {
            return Ok(gateway);
        }

        sqlx::query("UPDATE gateways SET is_default = FALSE, updated_at = CURRENT_TIMESTAMP WHERE is_default = TRUE")
            .execute(&mut *tx)
            .await
            .context("Failed to clear default gateway")?;
        let gateway = sqlx::query_as::<_, Gateway>(
            "UPDATE gateways SET is_default = TRUE, updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to set default gateway")?;
        tx.commit().await?;

        info!("Gateway {} is now the default", id);
        Ok(gateway)
    }
}

#[cfg(test)]
pub(crate) fn test_gateway(provider: &str, config: serde_json::Value) -> Gateway {
    let now = chrono::Utc::now();
    Gateway {
        id: 3,
        name: "Test".into(),
        provider: provider.into(),
        currency: "USD".into(),
        fee_percent: 2.5,
        fee_fixed: 30,
        min_amount: 100,
        max_amount: Some(100_000),
        config,
        is_active: true,
        is_default: false,
        sort_order: 0,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(provider: &str) -> GatewayInput {
        GatewayInput {
            name: "Card".into(),
            provider: provider.into(),
            currency: Some("eur".into()),
            fee_percent: Some(3.0),
            fee_fixed: Some(0),
            min_amount: Some(100),
            max_amount: None,
            config: None,
            is_active: None,
            sort_order: None,
        }
    }

    #[test]
    fn fee_is_rounded_percent_plus_fixed() {
        let gw = test_gateway("custom", json!({}));
        let q = quote(&gw, 999).unwrap();
        // 999 * 2.5% = 24.975 -> 25, plus 30 fixed
        assert_eq!(q.fee, 55);
        assert_eq!(q.total, 1054);
        assert_eq!(q.currency, "USD");
    }

    #[test]
    fn quote_enforces_limits() {
        let gw = test_gateway("custom", json!({}));
        assert!(quote(&gw, 99).is_err());
        assert!(quote(&gw, 100_001).is_err());
        assert!(quote(&gw, 100_000).is_ok());
    }

    #[test]
    fn normalizes_currency() {
        let (gw, provider) = validate_gateway(&input("stripe")).unwrap();
        assert_eq!(provider, GatewayProvider::Stripe);
        assert_eq!(gw.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn rejects_unknown_provider_and_bad_fees() {
        assert!(matches!(validate_gateway(&input("bitpay")), Err(AppError::BadRequest(_))));

        let mut i = input("custom");
        i.fee_percent = Some(120.0);
        assert!(validate_gateway(&i).is_err());

        let mut i = input("custom");
        i.max_amount = Some(50);
        assert!(validate_gateway(&i).is_err());
    }

    #[test]
    fn active_cryptomus_needs_credentials() {
        let mut i = input("cryptomus");
        assert!(validate_gateway(&i).is_err());

        i.config = Some(json!({"merchant_id": "m-1", "api_key": "k"}));
        assert!(validate_gateway(&i).is_ok());

        let mut inactive = input("cryptomus");
        inactive.is_active = Some(false);
        assert!(validate_gateway(&inactive).is_ok());
    }

    #[tokio::test]
    async fn default_gateway_moves_and_stays_protected() {
        use crate::services::fixtures::gateway_input;

        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let gateways = &state.gateways;
        assert!(matches!(gateways.default_gateway().await, Err(AppError::BadRequest(_))));

        let first = gateways.create(&gateway_input("First")).await.unwrap();
        let second = gateways.create(&gateway_input("Second")).await.unwrap();
        assert!(gateways.set_default(first.id).await.unwrap().is_default);
        assert!(gateways.set_default(second.id).await.unwrap().is_default);
        assert!(!gateways.get(first.id).await.unwrap().is_default);
        assert_eq!(gateways.default_gateway().await.unwrap().id, second.id);

        let mut deactivate = gateway_input("Second");
        deactivate.is_active = Some(false);
        assert!(matches!(gateways.update(second.id, &deactivate).await, Err(AppError::Conflict(_))));
        assert!(matches!(gateways.delete(second.id).await, Err(AppError::Conflict(_))));
        assert!(gateways.get(second.id).await.unwrap().is_active);

        let mut off = gateway_input("First");
        off.is_active = Some(false);
        let first = gateways.update(first.id, &off).await.unwrap();
        assert!(!first.is_active);
        assert!(matches!(gateways.set_default(first.id).await, Err(AppError::Conflict(_))));
        assert_eq!(gateways.delete(first.id).await.unwrap().id, first.id);
        assert!(matches!(gateways.get(first.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn gateway_with_payments_cannot_be_deleted() {
        use crate::services::fixtures::{gateway_input, pending_payment, register, storefront};

        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let (plan, used) = storefront(&state).await;
        let user = register(&state, 4001, None).await;
        pending_payment(&state, user.id, &plan).await;

        let spare = state.gateways.create(&gateway_input("Spare")).await.unwrap();
        state.gateways.set_default(spare.id).await.unwrap();
        assert!(matches!(state.gateways.delete(used.id).await, Err(AppError::Conflict(_))));
    }
}

