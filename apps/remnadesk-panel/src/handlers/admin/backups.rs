use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use remnadesk_db::models::backup::{Backup, BackupKind};
use remnadesk_db::models::page::{Page, Pagination};

use crate::auth::AdminClaims;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Page<Backup>>> {
    me.require_system()?;
    Ok(Json(state.backups.list(&page).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<Json<Backup>> {
    me.require_system()?;
    Ok(Json(state.backups.get(id).await?))
}

/// Runs pg_dump. A failed dump still answers 201 with the failed record.
pub async fn create(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
) -> AppResult<(StatusCode, Json<Backup>)> {
    me.require_system()?;
    let backup = state.backups.create(BackupKind::Manual, Some(me.admin_id)).await?;
    state
        .logging
        .admin(
            &me,
            "create_backup",
            format!("Backup {} '{}': {}", backup.id, backup.filename, backup.status),
        )
        .await;
    Ok((StatusCode::CREATED, Json(backup)))
}

pub async fn download(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    me.require_system()?;
    let (filename, bytes) = state.backups.download(id).await?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|e| AppError::Internal(e.into()))?;
    state
        .logging
        .admin(&me, "download_backup", format!("Downloaded backup {}", filename))
        .await;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    me.require_system()?;
    let backup = state.backups.delete(id).await?;
    state
        .logging
        .admin(&me, "delete_backup", format!("Deleted backup {} '{}'", backup.id, backup.filename))
        .await;
    Ok(StatusCode::NO_CONTENT)
}
