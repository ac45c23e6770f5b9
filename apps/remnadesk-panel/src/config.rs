use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemnawaveConfig {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub sync_interval_secs: u64,
}

impl RemnawaveConfig {
    pub fn is_configured(&self) -> bool {
        matches!((&self.base_url, &self.api_token), (Some(u), Some(t)) if !u.is_empty() && !t.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub listen_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub log_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub pg_dump_path: String,
    pub public_url: String,
    pub bot_token: Option<String>,
    pub cors_origins: Vec<String>,
    pub expiry_sweep_secs: u64,
    pub remnawave: RemnawaveConfig,
}

impl PanelConfig {
    /// Defaults, then `remnadesk.toml` (or `$REMNADESK_CONFIG`), then `REMNADESK__*` env vars.
    /// A bare `DATABASE_URL` is honoured too.
    pub fn load() -> Result<Self> {
        let path = std::env::var("REMNADESK_CONFIG").unwrap_or_else(|_| "remnadesk.toml".to_string());

        let mut builder = Self::defaults()?
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("REMNADESK")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors_origins")
                    .try_parsing(true),
            );

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database_url", url)?;
        }

        let cfg: PanelConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("database_url", "")?
            .set_default("max_connections", 20)?
            .set_default("listen_addr", "0.0.0.0:3000")?
            .set_default("jwt_secret", "")?
            .set_default("jwt_ttl_hours", 24)?
            .set_default("log_dir", ".")?
            .set_default("backup_dir", "./backups")?
            .set_default("pg_dump_path", "pg_dump")?
            .set_default("public_url", "http://localhost:3000")?
            .set_default("cors_origins", Vec::<String>::new())?
            .set_default("expiry_sweep_secs", 300)?
            .set_default("remnawave.sync_interval_secs", 0)?)
    }

    pub fn validate(&self) -> Result<()> {
        remnadesk_db::db::validate_database_url(&self.database_url)?;
        if self.jwt_secret.len() < 16 {
            anyhow::bail!("jwt_secret must be at least 16 characters");
        }
        if self.jwt_ttl_hours <= 0 {
            anyhow::bail!("jwt_ttl_hours must be positive");
        }
        Ok(())
    }

    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> PanelConfig {
    PanelConfig {
        database_url: "postgres://localhost/remnadesk_test".into(),
        max_connections: 1,
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        jwt_secret: "test-secret-test-secret".into(),
        jwt_ttl_hours: 1,
        log_dir: ".".into(),
        backup_dir: std::env::temp_dir().join("remnadesk-test-backups"),
        pg_dump_path: "pg_dump".into(),
        public_url: "https://panel.example.com/".into(),
        bot_token: Some("123456:TEST-TOKEN".into()),
        cors_origins: vec![],
        expiry_sweep_secs: 300,
        remnawave: RemnawaveConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_with_required_overrides() {
        let cfg: PanelConfig = PanelConfig::defaults()
            .unwrap()
            .set_override("database_url", "postgres://localhost/db")
            .unwrap()
            .set_override("jwt_secret", "0123456789abcdef")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.listen_addr.port(), 3000);
        assert_eq!(cfg.jwt_ttl_hours, 24);
        assert_eq!(cfg.remnawave.sync_interval_secs, 0);
        assert!(!cfg.remnawave.is_configured());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_short_secret_and_non_postgres_url() {
        let mut cfg = test_config();
        cfg.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.database_url = "mysql://localhost/db".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn public_url_has_no_trailing_slash() {
        assert_eq!(test_config().public_url(), "https://panel.example.com");
    }

    #[test]
    fn remnawave_needs_url_and_token() {
        let mut rw = RemnawaveConfig {
            base_url: Some("https://panel.example".into()),
            api_token: None,
            sync_interval_secs: 0,
        };
        assert!(!rw.is_configured());
        rw.api_token = Some("tkn".into());
        assert!(rw.is_configured());
        rw.api_token = Some(String::new());
        assert!(!rw.is_configured());
    }
}
