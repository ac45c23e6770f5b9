use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use remnadesk_db::models::gateway::{GatewayAdminView, GatewayInput};
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::payment::{Payment, PaymentStatus};
use serde::Deserialize;

use crate::auth::AdminClaims;
use crate::error::AppResult;
use crate::handlers::optional_json;
use crate::state::AppState;

pub async fn list_gateways(State(state): State<AppState>) -> AppResult<Json<Vec<GatewayAdminView>>> {
    let gateways = state.gateways.list(true).await?;
    Ok(Json(gateways.into_iter().map(GatewayAdminView::from).collect()))
}

pub async fn get_gateway(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<GatewayAdminView>> {
    Ok(Json(state.gateways.get(id).await?.into()))
}

pub async fn create_gateway(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(input): Json<GatewayInput>,
) -> AppResult<(StatusCode, Json<GatewayAdminView>)> {
    me.require_write()?;
    let gateway = state.gateways.create(&input).await?;
    state
        .logging
        .admin(
            &me,
            "create_gateway",
            format!("Created {} gateway {} '{}'", gateway.provider, gateway.id, gateway.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(gateway.into())))
}

pub async fn update_gateway(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(input): Json<GatewayInput>,
) -> AppResult<Json<GatewayAdminView>> {
    me.require_write()?;
    let gateway = state.gateways.update(id, &input).await?;
    state
        .logging
        .admin(&me, "update_gateway", format!("Updated gateway {} '{}'", gateway.id, gateway.name))
        .await;
    Ok(Json(gateway.into()))
}

pub async fn delete_gateway(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    me.require_write()?;
    let gateway = state.gateways.delete(id).await?;
    state
        .logging
        .admin(&me, "delete_gateway", format!("Deleted gateway {} '{}'", gateway.id, gateway.name))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_default_gateway(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<Json<GatewayAdminView>> {
    me.require_write()?;
    let gateway = state.gateways.set_default(id).await?;
    state
        .logging
        .admin(&me, "default_gateway", format!("Gateway {} '{}' is now the default", gateway.id, gateway.name))
        .await;
    Ok(Json(gateway.into()))
}

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub status: Option<String>,
    pub user_id: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentQuery>,
) -> AppResult<Json<Page<Payment>>> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<PaymentStatus>)
        .transpose()?;
    let page = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.payments.list(status, query.user_id, &page).await?))
}

pub async fn get_payment(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Payment>> {
    Ok(Json(state.payments.get(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    pub external_id: Option<String>,
}

/// Manual confirmation for payments settled outside the gateway.
pub async fn complete_payment(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    body: Bytes,
) -> AppResult<Json<Payment>> {
    me.require_write()?;
    let external_id = optional_json::<CompleteRequest>(&body)?.external_id;
    let payment = state.payments.complete_payment(id, external_id.as_deref()).await?;
    state
        .logging
        .admin(
            &me,
            "complete_payment",
            format!("Marked payment {} ({} {}) as completed", id, payment.amount, payment.currency),
        )
        .await;
    Ok(Json(payment))
}

pub async fn fail_payment(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
) -> AppResult<Json<Payment>> {
    me.require_write()?;
    let payment = state.payments.fail_payment(id).await?;
    state
        .logging
        .admin(&me, "fail_payment", format!("Marked payment {} as failed", id))
        .await;
    Ok(Json(payment))
}
