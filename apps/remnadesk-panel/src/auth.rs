use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use remnadesk_db::models::admin::AdminRole;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const CLIENT_ROLE: &str = "client";

/// initData older than this is rejected.
pub const INIT_DATA_MAX_AGE_SECS: i64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: String,
}

/// Authenticated admin, inserted into request extensions by `require_admin`.
#[derive(Debug, Clone)]
pub struct AdminClaims {
    pub admin_id: i64,
    pub username: String,
    pub role: AdminRole,
    pub ip: Option<String>,
}

impl AdminClaims {
    pub fn require_write(&self) -> AppResult<()> {
        if self.role.can_write() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Read-only role".into()))
        }
    }

    pub fn require_system(&self) -> AppResult<()> {
        if self.role.can_manage_system() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Superadmin role required".into()))
        }
    }
}

/// Authenticated Telegram user, inserted by `require_client`.
#[derive(Debug, Clone, Copy)]
pub struct ClientClaims {
    pub user_id: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn issue(&self, subject: i64, role: &str) -> AppResult<String> {
        let exp = (Utc::now() + chrono::Duration::hours(self.ttl_hours)).timestamp() as usize;
        let claims = Claims {
            sub: subject.to_string(),
            exp,
            role: role.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
    }
}

fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip(req: &Request) -> Option<String> {
    let headers = req.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|h| h.trim().to_string())
        })
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state.tokens.verify(bearer_token(req.headers())?)?;
    if claims.role == CLIENT_ROLE {
        return Err(AppError::Unauthorized("Admin token required".into()));
    }
    let admin_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Malformed token subject".into()))?;

    // Role and active flag come from the database so demotions apply immediately.
    let admin = state
        .access
        .find(admin_id)
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(|| AppError::Unauthorized("Account disabled".into()))?;

    let ip = client_ip(&req);
    req.extensions_mut().insert(AdminClaims {
        admin_id: admin.id,
        role: admin.role(),
        username: admin.username,
        ip,
    });

    Ok(next.run(req).await)
}

pub async fn require_client(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = state.tokens.verify(bearer_token(req.headers())?)?;
    if claims.role != CLIENT_ROLE {
        return Err(AppError::Unauthorized("Client token required".into()));
    }
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Malformed token subject".into()))?;

    req.extensions_mut().insert(ClientClaims { user_id });
    Ok(next.run(req).await)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl TelegramUser {
    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Clone)]
pub struct TelegramInitData {
    pub user: TelegramUser,
    pub start_param: Option<String>,
    pub auth_date: i64,
}

/// Checks a Telegram WebApp `initData` string against the bot token.
///
/// The secret is `HMAC_SHA256(key = "WebAppData", bot_token)`; the hash covers every
/// other field, decoded, sorted by key and joined as `key=value` lines.
pub fn validate_init_data(init_data: &str, bot_token: &str, now: i64) -> AppResult<TelegramInitData> {
    let params: HashMap<String, String> = url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();

    let hash = params
        .get("hash")
        .ok_or_else(|| AppError::BadRequest("Missing hash".into()))?;
    let expected = hex::decode(hash).map_err(|_| AppError::Unauthorized("Invalid signature".into()))?;

    let mut pairs: Vec<String> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "hash")
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    let data_check_string = pairs.join("\n");

    let mut secret = Hmac::<Sha256>::new_from_slice(b"WebAppData")
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hmac init: {}", e)))?;
    secret.update(bot_token.as_bytes());
    let secret_key = secret.finalize().into_bytes();

    let mut mac = Hmac::<Sha256>::new_from_slice(&secret_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hmac init: {}", e)))?;
    mac.update(data_check_string.as_bytes());
    if mac.verify_slice(&expected).is_err() {
        warn!("Telegram initData signature mismatch");
        return Err(AppError::Unauthorized("Invalid signature".into()));
    }

    let auth_date: i64 = params
        .get("auth_date")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AppError::BadRequest("Missing auth_date".into()))?;
    if now - auth_date > INIT_DATA_MAX_AGE_SECS {
        return Err(AppError::Unauthorized("initData expired".into()));
    }

    let user: TelegramUser = params
        .get("user")
        .ok_or_else(|| AppError::BadRequest("Missing user data".into()))
        .and_then(|u| {
            serde_json::from_str(u).map_err(|_| AppError::BadRequest("Invalid user JSON".into()))
        })?;

    let start_param = params
        .get("start_param")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(TelegramInitData {
        user,
        start_param,
        auth_date,
    })
}

#[cfg(test)]
pub(crate) fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> String {
    let mut pairs: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();

    let mut secret = Hmac::<Sha256>::new_from_slice(b"WebAppData").unwrap();
    secret.update(bot_token.as_bytes());
    let mut mac = Hmac::<Sha256>::new_from_slice(&secret.finalize().into_bytes()).unwrap();
    mac.update(pairs.join("\n").as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut out = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in fields {
        out.append_pair(k, v);
    }
    out.append_pair("hash", &hash);
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456:TEST-TOKEN";
    const USER: &str = r#"{"id":42,"first_name":"Ann","last_name":"Lee","username":"ann","language_code":"en"}"#;

    #[test]
    fn token_roundtrip_keeps_subject_and_role() {
        let issuer = TokenIssuer::new("test-secret-test-secret", 1);
        let token = issuer.issue(7, "admin").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = TokenIssuer::new("secret-one-secret-one", 1).issue(1, CLIENT_ROLE).unwrap();
        let err = TokenIssuer::new("secret-two-secret-two", 1).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new("test-secret-test-secret", -2);
        let token = issuer.issue(1, "admin").unwrap();
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn role_guards() {
        let mut claims = AdminClaims {
            admin_id: 1,
            username: "ops".into(),
            role: AdminRole::Support,
            ip: None,
        };
        assert!(matches!(claims.require_write(), Err(AppError::Forbidden(_))));
        claims.role = AdminRole::Admin;
        assert!(claims.require_write().is_ok());
        assert!(claims.require_system().is_err());
        claims.role = AdminRole::Superadmin;
        assert!(claims.require_system().is_ok());
    }

    #[test]
    fn accepts_valid_init_data() {
        let now = Utc::now().timestamp();
        let auth_date = now.to_string();
        let data = sign_init_data(
            &[("auth_date", &auth_date), ("start_param", "PABCDEFG"), ("user", USER)],
            BOT_TOKEN,
        );

        let parsed = validate_init_data(&data, BOT_TOKEN, now).unwrap();
        assert_eq!(parsed.user.id, 42);
        assert_eq!(parsed.user.username.as_deref(), Some("ann"));
        assert_eq!(parsed.user.full_name().as_deref(), Some("Ann Lee"));
        assert_eq!(parsed.start_param.as_deref(), Some("PABCDEFG"));
    }

    #[test]
    fn rejects_tampered_init_data() {
        let now = Utc::now().timestamp();
        let auth_date = now.to_string();
        let data = sign_init_data(&[("auth_date", &auth_date), ("user", USER)], BOT_TOKEN);
        let tampered = data.replace("%22id%22%3A42", "%22id%22%3A43");
        assert_ne!(data, tampered);

        let err = validate_init_data(&tampered, BOT_TOKEN, now).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(validate_init_data(&data, "999:OTHER", now).is_err());
    }

    #[test]
    fn rejects_stale_or_unsigned_init_data() {
        let now = Utc::now().timestamp();
        let old = (now - INIT_DATA_MAX_AGE_SECS - 10).to_string();
        let data = sign_init_data(&[("auth_date", &old), ("user", USER)], BOT_TOKEN);
        assert!(matches!(
            validate_init_data(&data, BOT_TOKEN, now),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            validate_init_data("user=%7B%7D&auth_date=1", BOT_TOKEN, now),
            Err(AppError::BadRequest(_))
        ));
    }
}
