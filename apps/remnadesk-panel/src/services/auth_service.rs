use std::sync::Arc;

use chrono::Utc;
use remnadesk_db::models::admin::Admin;
use remnadesk_db::models::user::User;
use remnadesk_db::repositories::admin_repo::AdminRepository;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use super::client_service::{ClientService, TelegramProfile};
use crate::auth::{CLIENT_ROLE, TokenIssuer, validate_init_data};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct AdminLogin {
    pub token: String,
    pub admin: Admin,
}

#[derive(Debug, Serialize)]
pub struct ClientLogin {
    pub token: String,
    pub user: User,
    pub is_new: bool,
}

pub struct AuthService {
    admins: AdminRepository,
    tokens: TokenIssuer,
    clients: Arc<ClientService>,
    bot_token: Option<String>,
}

impl AuthService {
    pub fn new(
        pool: PgPool,
        tokens: TokenIssuer,
        clients: Arc<ClientService>,
        bot_token: Option<String>,
    ) -> Self {
        Self {
            admins: AdminRepository::new(pool),
            tokens,
            clients,
            bot_token: bot_token.filter(|t| !t.is_empty()),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> AppResult<AdminLogin> {
        let invalid = || AppError::Unauthorized("Invalid username or password".into());

        let Some(admin) = self.admins.get_by_username(username.trim()).await? else {
            warn!("Login attempt for unknown admin '{}'", username);
            return Err(invalid());
        };
        if !admin.is_active {
            warn!("Login attempt for disabled admin '{}'", admin.username);
            return Err(invalid());
        }
        if !bcrypt::verify(password, &admin.password_hash).unwrap_or(false) {
            warn!("Wrong password for admin '{}'", admin.username);
            return Err(invalid());
        }

        self.admins.touch_login(admin.id).await?;
        let token = self.tokens.issue(admin.id, admin.role().as_str())?;
        info!("Admin '{}' logged in", admin.username);
        Ok(AdminLogin { token, admin })
    }

    pub async fn auth_telegram(&self, init_data: &str) -> AppResult<ClientLogin> {
        let bot_token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("bot_token is not configured")))?;

        let data = validate_init_data(init_data, bot_token, Utc::now().timestamp())?;
        let profile = TelegramProfile {
            tg_id: data.user.id,
            full_name: data.user.full_name(),
            username: data.user.username,
            language_code: data.user.language_code,
        };

        let (user, is_new) = self
            .clients
            .register(&profile, data.start_param.as_deref())
            .await?;
        if user.is_banned {
            return Err(AppError::Forbidden("Account is banned".into()));
        }

        let token = self.tokens.issue(user.id, CLIENT_ROLE)?;
        Ok(ClientLogin { token, user, is_new })
    }
}
