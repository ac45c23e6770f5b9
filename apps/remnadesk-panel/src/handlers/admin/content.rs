use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use remnadesk_db::models::banner::{Banner, BannerInput};
use remnadesk_db::models::notification::{Notification, NotificationInput};
use remnadesk_db::models::page::{Page, Pagination};
use serde::Deserialize;

use crate::auth::AdminClaims;
use crate::error::AppResult;
use crate::state::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Page<Notification>>> {
    Ok(Json(state.notifications.list(&page).await?))
}

pub async fn create_notification(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(input): Json<NotificationInput>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    me.require_write()?;
    let notification = state.notifications.create(&input, Some(me.admin_id)).await?;
    let audience = match notification.user_id {
        Some(user_id) => format!("user {}", user_id),
        None => "all users".to_string(),
    };
    state
        .logging
        .admin(
            &me,
            "create_notification",
            format!("Sent '{}' to {}", notification.title, audience),
        )
        .await;
    Ok((StatusCode::CREATED, Json(notification)))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    me.require_write()?;
    state.notifications.delete(id).await?;
    state
        .logging
        .admin(&me, "delete_notification", format!("Deleted notification {}", id))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_banners(State(state): State<AppState>) -> AppResult<Json<Vec<Banner>>> {
    Ok(Json(state.banners.list().await?))
}

pub async fn get_banner(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Banner>> {
    Ok(Json(state.banners.get(id).await?))
}

pub async fn create_banner(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(input): Json<BannerInput>,
) -> AppResult<(StatusCode, Json<Banner>)> {
    me.require_write()?;
    let banner = state.banners.create(&input).await?;
    state
        .logging
        .admin(&me, "create_banner", format!("Created banner {} '{}'", banner.id, banner.title))
        .await;
    Ok((StatusCode::CREATED, Json(banner)))
}

pub async fn update_banner(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(input): Json<BannerInput>,
) -> AppResult<Json<Banner>> {
    me.require_write()?;
    let banner = state.banners.update(id, &input).await?;
    state
        .logging
        .admin(&me, "update_banner", format!("Updated banner {} '{}'", banner.id, banner.title))
        .await;
    Ok(Json(banner))
}

pub async fn delete_banner(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    me.require_write()?;
    state.banners.delete(id).await?;
    state
        .logging
        .admin(&me, "delete_banner", format!("Deleted banner {}", id))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<i64>,
}

pub async fn reorder_banners(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(req): Json<ReorderRequest>,
) -> AppResult<Json<Vec<Banner>>> {
    me.require_write()?;
    state.banners.reorder(&req.ids).await?;
    state
        .logging
        .admin(&me, "reorder_banners", format!("Reordered {} banners", req.ids.len()))
        .await;
    Ok(Json(state.banners.list().await?))
}
