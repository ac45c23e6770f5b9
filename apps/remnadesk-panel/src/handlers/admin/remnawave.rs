use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;

use crate::auth::AdminClaims;
use crate::error::AppResult;
use crate::services::remnawave_sync_service::SyncReport;
use crate::state::AppState;

pub async fn sync_all(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
) -> AppResult<Json<SyncReport>> {
    me.require_write()?;
    let report = state.remnawave.sync_all().await?;
    state
        .logging
        .admin(
            &me,
            "remnawave_sync",
            format!(
                "Remnawave sync: {} fetched, {} created, {} updated, {} unmatched",
                report.fetched, report.created, report.updated, report.unmatched
            ),
        )
        .await;
    Ok(Json(report))
}

pub async fn unlink(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    me.require_write()?;
    let link = state.remnawave.unlink(id).await?;
    state
        .logging
        .admin(
            &me,
            "remnawave_unlink",
            format!("Unlinked {} ({}) from user {}", link.username, link.remnawave_uuid, link.user_id),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn system_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    Ok(Json(state.remnawave.system_stats().await?))
}
