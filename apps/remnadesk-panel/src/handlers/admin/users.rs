use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::remnawave::RemnawaveLink;
use remnadesk_db::models::subscription::{Subscription, SubscriptionWithPlan};
use remnadesk_db::models::user::{User, UserFilter, UserUpdate};
use serde::Deserialize;

use crate::auth::AdminClaims;
use crate::error::AppResult;
use crate::services::client_service::UserDetails;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub q: Option<String>,
    pub banned: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<UserListQuery>) -> AppResult<Json<Page<User>>> {
    let filter = UserFilter {
        q: query.q,
        banned: query.banned,
    };
    let page = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.clients.list(&filter, &page).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<UserDetails>> {
    Ok(Json(state.clients.get(id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(patch): Json<UserUpdate>,
) -> AppResult<Json<User>> {
    me.require_write()?;
    let user = state.clients.update(id, &patch).await?;
    let details = match patch.is_banned {
        Some(true) => format!("Banned user {}", id),
        Some(false) => format!("Unbanned user {}", id),
        None => format!("Updated user {}", id),
    };
    state.logging.admin(&me, "update_user", details).await;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    pub delta: i64,
    pub reason: String,
}

pub async fn adjust_balance(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(req): Json<BalanceRequest>,
) -> AppResult<Json<User>> {
    me.require_write()?;
    let user = state.clients.adjust_balance(id, req.delta, &req.reason).await?;
    state
        .logging
        .admin(
            &me,
            "adjust_balance",
            format!("Balance of user {} changed by {} ({})", id, req.delta, req.reason.trim()),
        )
        .await;
    Ok(Json(user))
}

pub async fn subscriptions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<SubscriptionWithPlan>>> {
    state.clients.find(id).await?;
    Ok(Json(state.subscriptions.list_for_user(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub plan_id: i64,
    pub days: Option<i32>,
}

pub async fn grant_subscription(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(req): Json<GrantRequest>,
) -> AppResult<(StatusCode, Json<Subscription>)> {
    me.require_write()?;
    let sub = state.subscriptions.grant(id, req.plan_id, req.days).await?;
    state
        .logging
        .admin(
            &me,
            "grant_subscription",
            format!("Granted plan {} to user {} (subscription {})", req.plan_id, id, sub.id),
        )
        .await;
    Ok((StatusCode::CREATED, Json(sub)))
}

pub async fn sync_remnawave(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<RemnawaveLink>>> {
    me.require_write()?;
    let links = state.remnawave.sync_user(id).await?;
    state
        .logging
        .admin(&me, "sync_user", format!("Synced user {} with Remnawave: {} link(s)", id, links.len()))
        .await;
    Ok(Json(links))
}
