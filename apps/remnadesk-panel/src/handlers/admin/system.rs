use std::collections::{BTreeMap, HashMap};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use remnadesk_db::models::activity::ActivityEntry;
use remnadesk_db::models::admin::{Admin, AdminRole};
use remnadesk_db::models::page::{Page, Pagination};
use serde::{Deserialize, Serialize};

use crate::auth::AdminClaims;
use crate::error::{AppError, AppResult};
use crate::settings::validate_setting;
use crate::state::AppState;

pub async fn list_admins(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
) -> AppResult<Json<Vec<Admin>>> {
    me.require_system()?;
    Ok(Json(state.access.list().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

pub async fn create_admin(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(req): Json<CreateAdminRequest>,
) -> AppResult<(StatusCode, Json<Admin>)> {
    me.require_system()?;
    let role: AdminRole = req.role.parse()?;
    let admin = state.access.create(&req.username, &req.password, role).await?;
    state
        .logging
        .admin(&me, "create_admin", format!("Created {} '{}'", admin.role, admin.username))
        .await;
    Ok((StatusCode::CREATED, Json(admin)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdminRequest {
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_admin(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAdminRequest>,
) -> AppResult<Json<Admin>> {
    me.require_system()?;
    let role = req.role.as_deref().map(str::parse::<AdminRole>).transpose()?;
    let admin = state.access.update(me.admin_id, id, role, req.is_active).await?;
    state
        .logging
        .admin(
            &me,
            "update_admin",
            format!("Admin '{}': role {}, active {}", admin.username, admin.role, admin.is_active),
        )
        .await;
    Ok(Json(admin))
}

pub async fn delete_admin(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    me.require_system()?;
    let admin = state.access.delete(me.admin_id, id).await?;
    state
        .logging
        .admin(&me, "delete_admin", format!("Deleted admin '{}'", admin.username))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(req): Json<PasswordRequest>,
) -> AppResult<StatusCode> {
    me.require_system()?;
    let admin = state.access.reset_password(id, &req.password).await?;
    state
        .logging
        .admin(&me, "reset_password", format!("Reset password of '{}'", admin.username))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
) -> AppResult<Json<BTreeMap<String, String>>> {
    me.require_system()?;
    Ok(Json(state.settings.all().await))
}

/// Validates every pair first so a bad value leaves nothing half-written.
pub fn validate_settings(input: HashMap<String, String>) -> AppResult<HashMap<String, String>> {
    let mut errors = Vec::new();
    let mut valid = HashMap::with_capacity(input.len());
    for (key, value) in input {
        match validate_setting(&key, &value) {
            Ok(normalized) => {
                valid.insert(key, normalized);
            }
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        errors.sort();
        return Err(AppError::BadRequest(errors.join("; ")));
    }
    if valid.is_empty() {
        return Err(AppError::BadRequest("No settings given".into()));
    }
    Ok(valid)
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(input): Json<HashMap<String, String>>,
) -> AppResult<Json<BTreeMap<String, String>>> {
    me.require_system()?;
    let valid = validate_settings(input)?;
    let mut keys: Vec<&str> = valid.keys().map(String::as_str).collect();
    keys.sort_unstable();
    let details = format!("Updated settings: {}", keys.join(", "));

    state.settings.set_multiple(valid).await?;
    state.logging.admin(&me, "update_settings", details).await;
    Ok(Json(state.settings.all().await))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub action: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    #[serde(flatten)]
    pub page: Page<ActivityEntry>,
    pub actions: Vec<String>,
}

pub async fn logs(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<LogPage>> {
    me.require_system()?;
    let pagination = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let action = query.action.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let page = state.logging.list(action, &pagination).await?;
    let actions = state.logging.actions().await?;
    Ok(Json(LogPage { page, actions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_the_whole_batch_on_one_bad_value() {
        let mut input = HashMap::new();
        input.insert("partner_commission_percent".to_string(), "25".to_string());
        input.insert("min_payout_amount".to_string(), "-5".to_string());
        let err = validate_settings(input).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut input = HashMap::new();
        input.insert("theme".to_string(), "dark".to_string());
        assert!(validate_settings(input).is_err());
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(validate_settings(HashMap::new()).is_err());
    }

    #[test]
    fn accepted_values_are_normalized() {
        let mut input = HashMap::new();
        input.insert("referral_level1_percent".to_string(), " 7.5 ".to_string());
        let valid = validate_settings(input).unwrap();
        assert_eq!(valid.len(), 1);
        assert!(valid.contains_key("referral_level1_percent"));
    }
}
