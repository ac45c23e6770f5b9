use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::services::statistics_service::{Overview, SeriesPoint, TopPlan};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub days: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<i64>,
}

pub async fn overview(State(state): State<AppState>) -> AppResult<Json<Overview>> {
    Ok(Json(state.stats.overview().await?))
}

pub async fn revenue(
    State(state): State<AppState>,
    Query(q): Query<SeriesQuery>,
) -> AppResult<Json<Vec<SeriesPoint>>> {
    Ok(Json(state.stats.revenue_series(q.days.unwrap_or(30)).await?))
}

pub async fn registrations(
    State(state): State<AppState>,
    Query(q): Query<SeriesQuery>,
) -> AppResult<Json<Vec<SeriesPoint>>> {
    Ok(Json(state.stats.registrations_series(q.days.unwrap_or(30)).await?))
}

pub async fn top_plans(State(state): State<AppState>, Query(q): Query<TopQuery>) -> AppResult<Json<Vec<TopPlan>>> {
    Ok(Json(state.stats.top_plans(q.limit.unwrap_or(5)).await?))
}
