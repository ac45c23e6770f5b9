use chrono::{DateTime, Utc};
use remnadesk_db::models::remnawave::RemnawaveLinkData;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every Remnawave response body is `{"response": ...}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub response: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Disabled,
    Limited,
    Expired,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemnawaveUser {
    pub uuid: Uuid,
    #[serde(default)]
    pub short_uuid: Option<String>,
    pub username: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<i64>,
    #[serde(default)]
    pub subscription_url: Option<String>,
    /// Some panel versions send byte counters as floats.
    #[serde(default)]
    pub traffic_limit_bytes: Option<f64>,
    #[serde(default)]
    pub used_traffic_bytes: Option<f64>,
    #[serde(default)]
    pub expire_at: Option<DateTime<Utc>>,
}

impl RemnawaveUser {
    pub fn link_data(&self) -> RemnawaveLinkData {
        RemnawaveLinkData {
            remnawave_uuid: self.uuid,
            short_uuid: self.short_uuid.clone(),
            username: self.username.clone(),
            status: self.status.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            subscription_url: self.subscription_url.clone(),
            traffic_limit_bytes: self.traffic_limit_bytes.unwrap_or(0.0).max(0.0) as i64,
            used_traffic_bytes: self.used_traffic_bytes.unwrap_or(0.0).max(0.0) as i64,
            expire_at: self.expire_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UsersPage {
    #[serde(default)]
    pub users: Vec<RemnawaveUser>,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub expire_at: DateTime<Utc>,
    pub traffic_limit_bytes: i64,
    pub traffic_limit_strategy: String,
    pub status: UserStatus,
    pub telegram_id: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_limit_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_users_page() {
        let body = r#"{
            "response": {
                "total": 2,
                "users": [
                    {
                        "uuid": "6f1c3f1e-6a55-4d2e-9b0a-0d2c2b1e9a11",
                        "shortUuid": "abc123",
                        "username": "rd42_1",
                        "status": "ACTIVE",
                        "telegramId": 42,
                        "subscriptionUrl": "https://sub.example/abc123",
                        "trafficLimitBytes": 107374182400,
                        "usedTrafficBytes": 1024,
                        "expireAt": "2026-12-01T00:00:00.000Z"
                    },
                    {
                        "uuid": "1d7b8c4e-2f5a-4c3b-8e9d-123456789abc",
                        "username": "legacy",
                        "telegramId": null
                    }
                ]
            }
        }"#;

        let page: Envelope<UsersPage> = serde_json::from_str(body).unwrap();
        assert_eq!(page.response.total, 2);
        let first = &page.response.users[0];
        assert_eq!(first.telegram_id, Some(42));

        let data = first.link_data();
        assert_eq!(data.traffic_limit_bytes, 107_374_182_400);
        assert_eq!(data.used_traffic_bytes, 1024);
        assert_eq!(data.status, "ACTIVE");

        let second = page.response.users[1].link_data();
        assert_eq!(second.status, "UNKNOWN");
        assert_eq!(second.traffic_limit_bytes, 0);
    }

    #[test]
    fn update_request_omits_unset_fields() {
        let req = UpdateUserRequest {
            uuid: Uuid::nil(),
            status: Some(UserStatus::Disabled),
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["status"], "DISABLED");
        assert!(json.get("expireAt").is_none());
    }
}
