use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::models::{CreateUserRequest, Envelope, RemnawaveUser, UpdateUserRequest, UsersPage};
use crate::config::RemnawaveConfig;

#[derive(Clone)]
pub struct RemnawaveClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl RemnawaveClient {
    pub fn new(client: Client, base_url: &str, api_token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    pub fn from_config(client: Client, cfg: &RemnawaveConfig) -> Result<Self> {
        let base_url = cfg
            .base_url
            .as_deref()
            .context("remnawave.base_url is not set")?;
        let token = cfg
            .api_token
            .as_deref()
            .context("remnawave.api_token is not set")?;
        url::Url::parse(base_url).context("remnawave.base_url is not a valid URL")?;
        Ok(Self::new(client, base_url, token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let response = response
            .error_for_status()
            .with_context(|| format!("Remnawave rejected {}", what))?;
        let body: Envelope<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to decode Remnawave {} response", what))?;
        Ok(body.response)
    }

    /// One page of panel users, `start` is a row offset.
    pub async fn list_users(&self, start: i64, size: i64) -> Result<(Vec<RemnawaveUser>, i64)> {
        let response = self
            .client
            .get(self.url("users"))
            .bearer_auth(&self.api_token)
            .query(&[("start", start), ("size", size)])
            .send()
            .await
            .context("Failed to reach Remnawave")?;

        let page: UsersPage = Self::decode(response, "user list").await?;
        Ok((page.users, page.total))
    }

    pub async fn get_users_by_telegram_id(&self, tg_id: i64) -> Result<Vec<RemnawaveUser>> {
        let response = self
            .client
            .get(self.url(&format!("users/by-telegram-id/{}", tg_id)))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .context("Failed to reach Remnawave")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        Self::decode(response, "telegram lookup").await
    }

    pub async fn get_user(&self, uuid: Uuid) -> Result<Option<RemnawaveUser>> {
        let response = self
            .client
            .get(self.url(&format!("users/{}", uuid)))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .context("Failed to reach Remnawave")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response, "user lookup").await.map(Some)
    }

    pub async fn create_user(&self, req: &CreateUserRequest) -> Result<RemnawaveUser> {
        let response = self
            .client
            .post(self.url("users"))
            .bearer_auth(&self.api_token)
            .json(req)
            .send()
            .await
            .context("Failed to reach Remnawave")?;

        Self::decode(response, "user creation").await
    }

    pub async fn update_user(&self, req: &UpdateUserRequest) -> Result<RemnawaveUser> {
        let response = self
            .client
            .patch(self.url("users"))
            .bearer_auth(&self.api_token)
            .json(req)
            .send()
            .await
            .context("Failed to reach Remnawave")?;

        Self::decode(response, "user update").await
    }

    pub async fn system_stats(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(self.url("system/stats"))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .context("Failed to reach Remnawave")?;

        Self::decode(response, "system stats").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_api_urls_without_double_slashes() {
        let c = RemnawaveClient::new(Client::new(), "https://panel.example/", "tkn");
        assert_eq!(c.url("users"), "https://panel.example/api/users");
        assert_eq!(c.url("/system/stats"), "https://panel.example/api/system/stats");
    }

    #[test]
    fn config_needs_a_valid_url() {
        let cfg = RemnawaveConfig {
            base_url: Some("not a url".into()),
            api_token: Some("tkn".into()),
            sync_interval_secs: 0,
        };
        assert!(RemnawaveClient::from_config(Client::new(), &cfg).is_err());
    }
}
