use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;

pub const PARTNER_COMMISSION_PERCENT: &str = "partner_commission_percent";
pub const MIN_PAYOUT_AMOUNT: &str = "min_payout_amount";

/// Keys an admin may edit, with the value used when the row is missing.
pub const KNOWN_SETTINGS: &[(&str, SettingKind, &str)] = &[
    (PARTNER_COMMISSION_PERCENT, SettingKind::Percent, "20"),
    ("referral_level1_percent", SettingKind::Percent, "10"),
    ("referral_level2_percent", SettingKind::Percent, "5"),
    ("referral_level3_percent", SettingKind::Percent, "2"),
    (MIN_PAYOUT_AMOUNT, SettingKind::Amount, "1000"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// 0..=100, fractional allowed.
    Percent,
    /// Non-negative integer in minor currency units.
    Amount,
}

pub fn referral_level_key(level: i16) -> String {
    format!("referral_level{}_percent", level)
}

fn default_for(key: &str) -> Option<&'static str> {
    KNOWN_SETTINGS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, _, d)| *d)
}

/// Checks a key/value pair before it is written. Returns the normalized value.
pub fn validate_setting(key: &str, value: &str) -> std::result::Result<String, String> {
    let (_, kind, _) = KNOWN_SETTINGS
        .iter()
        .find(|(k, _, _)| *k == key)
        .ok_or_else(|| format!("unknown setting '{}'", key))?;

    let value = value.trim();
    match kind {
        SettingKind::Percent => {
            let v: f64 = value
                .parse()
                .map_err(|_| format!("{} must be a number", key))?;
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(format!("{} must be between 0 and 100", key));
            }
        }
        SettingKind::Amount => {
            let v: i64 = value
                .parse()
                .map_err(|_| format!("{} must be an integer", key))?;
            if v < 0 {
                return Err(format!("{} must not be negative", key));
            }
        }
    }
    Ok(value.to_string())
}

#[derive(Debug, Clone)]
pub struct SettingsService {
    pool: PgPool,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl SettingsService {
    /// Starts with an empty cache; call `reload_cache` before serving.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn reload_cache(&self) -> Result<()> {
        info!("Reloading settings cache from database");
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch settings from DB")?;

        let mut cache = self.cache.write().await;
        cache.clear();
        cache.extend(rows);

        info!("Cache reloaded with {} items", cache.len());
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let cache = self.cache.read().await;
        cache.get(key).cloned()
    }

    pub async fn get_f64(&self, key: &str) -> f64 {
        let fallback = default_for(key).and_then(|d| d.parse().ok()).unwrap_or(0.0);
        self.get(key)
            .await
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(fallback)
    }

    pub async fn get_i64(&self, key: &str) -> i64 {
        let fallback = default_for(key).and_then(|d| d.parse().ok()).unwrap_or(0);
        self.get(key)
            .await
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(fallback)
    }

    pub async fn partner_commission_percent(&self) -> f64 {
        self.get_f64(PARTNER_COMMISSION_PERCENT).await
    }

    pub async fn referral_percent(&self, level: i16) -> f64 {
        self.get_f64(&referral_level_key(level)).await
    }

    pub async fn min_payout_amount(&self) -> i64 {
        self.get_i64(MIN_PAYOUT_AMOUNT).await
    }

    /// Every known key with its effective value.
    pub async fn all(&self) -> BTreeMap<String, String> {
        let cache = self.cache.read().await;
        KNOWN_SETTINGS
            .iter()
            .map(|(key, _, default)| {
                let value = cache.get(*key).cloned().unwrap_or_else(|| default.to_string());
                (key.to_string(), value)
            })
            .collect()
    }

    /// Writes already-validated values in one transaction, then refreshes the cache.
    pub async fn set_multiple(&self, settings: HashMap<String, String>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in &settings {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES ($1, $2)
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = CURRENT_TIMESTAMP",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to update setting {}", key))?;
        }

        tx.commit().await?;

        let mut cache = self.cache.write().await;
        cache.extend(settings);

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn put_cached(&self, key: &str, value: &str) {
        self.cache.write().await.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_service() -> SettingsService {
        let pool = PgPool::connect_lazy("postgres://localhost/remnadesk_test").unwrap();
        SettingsService::new(pool)
    }

    #[test]
    fn validates_percentages() {
        assert_eq!(validate_setting("referral_level1_percent", " 12.5 ").unwrap(), "12.5");
        assert!(validate_setting("referral_level1_percent", "101").is_err());
        assert!(validate_setting("referral_level1_percent", "-1").is_err());
        assert!(validate_setting("referral_level1_percent", "NaN").is_err());
        assert!(validate_setting("referral_level1_percent", "ten").is_err());
    }

    #[test]
    fn validates_amounts_and_keys() {
        assert!(validate_setting(MIN_PAYOUT_AMOUNT, "500").is_ok());
        assert!(validate_setting(MIN_PAYOUT_AMOUNT, "5.5").is_err());
        assert!(validate_setting(MIN_PAYOUT_AMOUNT, "-5").is_err());
        assert!(validate_setting("bot_token", "x").is_err());
    }

    #[test]
    fn level_keys() {
        assert_eq!(referral_level_key(2), "referral_level2_percent");
    }

    #[tokio::test]
    async fn falls_back_to_defaults() {
        let settings = lazy_service();
        assert_eq!(settings.partner_commission_percent().await, 20.0);
        assert_eq!(settings.referral_percent(1).await, 10.0);
        assert_eq!(settings.referral_percent(3).await, 2.0);
        assert_eq!(settings.min_payout_amount().await, 1000);
    }

    #[tokio::test]
    async fn cached_values_win_over_defaults() {
        let settings = lazy_service();
        settings.put_cached("referral_level2_percent", "7.5").await;
        settings.put_cached(MIN_PAYOUT_AMOUNT, "garbage").await;
        assert_eq!(settings.referral_percent(2).await, 7.5);
        assert_eq!(settings.min_payout_amount().await, 1000);

        let all = settings.all().await;
        assert_eq!(all.len(), KNOWN_SETTINGS.len());
        assert_eq!(all["referral_level2_percent"], "7.5");
    }
}
