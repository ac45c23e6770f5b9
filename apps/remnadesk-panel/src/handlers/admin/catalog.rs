use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use remnadesk_db::models::plan::{Plan, PlanInput};
use remnadesk_db::models::subscription::Subscription;
use serde::Deserialize;

use crate::auth::AdminClaims;
use crate::error::AppResult;
use crate::state::AppState;

pub async fn list_plans(State(state): State<AppState>) -> AppResult<Json<Vec<Plan>>> {
    Ok(Json(state.plans.list(false).await?))
}

pub async fn get_plan(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Plan>> {
    Ok(Json(state.plans.get(id).await?))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(input): Json<PlanInput>,
) -> AppResult<(StatusCode, Json<Plan>)> {
    me.require_write()?;
    let plan = state.plans.create(&input).await?;
    state
        .logging
        .admin(&me, "create_plan", format!("Created plan {} '{}'", plan.id, plan.name))
        .await;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(input): Json<PlanInput>,
) -> AppResult<Json<Plan>> {
    me.require_write()?;
    let plan = state.plans.update(id, &input).await?;
    state
        .logging
        .admin(&me, "update_plan", format!("Updated plan {} '{}'", plan.id, plan.name))
        .await;
    Ok(Json(plan))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    me.require_write()?;
    let plan = state.plans.delete(id).await?;
    state
        .logging
        .admin(&me, "delete_plan", format!("Deleted plan {} '{}'", plan.id, plan.name))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub days: i32,
}

pub async fn extend_subscription(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(req): Json<ExtendRequest>,
) -> AppResult<Json<Subscription>> {
    me.require_write()?;
    let sub = state.subscriptions.extend(id, req.days).await?;
    state
        .logging
        .admin(
            &me,
            "extend_subscription",
            format!("Extended subscription {} by {} days, now expires {}", id, req.days, sub.expires_at),
        )
        .await;
    Ok(Json(sub))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<Json<Subscription>> {
    me.require_write()?;
    let sub = state.subscriptions.cancel(id).await?;
    state
        .logging
        .admin(&me, "cancel_subscription", format!("Cancelled subscription {}", id))
        .await;
    Ok(Json(sub))
}
