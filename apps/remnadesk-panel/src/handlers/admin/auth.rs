use axum::{Extension, Json, extract::State};
use remnadesk_db::models::admin::Admin;
use serde::Deserialize;

use crate::auth::AdminClaims;
use crate::error::AppResult;
use crate::services::auth_service::AdminLogin;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> AppResult<Json<AdminLogin>> {
    let login = state.auth.login(&req.username, &req.password).await?;
    state
        .logging
        .system("admin_login", format!("Admin '{}' logged in", login.admin.username))
        .await;
    Ok(Json(login))
}

pub async fn me(State(state): State<AppState>, Extension(admin): Extension<AdminClaims>) -> AppResult<Json<Admin>> {
    Ok(Json(state.access.get(admin.admin_id).await?))
}
