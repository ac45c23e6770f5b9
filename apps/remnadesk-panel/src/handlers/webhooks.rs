use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{Value, json};
use tracing::info;

use crate::error::AppResult;
use crate::state::AppState;

/// Provider callbacks. The body is passed through untouched so the adapter can
/// verify its signature over the exact bytes that were signed.
pub async fn payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<Value>> {
    let payment = state.payments.handle_webhook(&provider, &headers, &body).await?;
    info!("{} webhook processed for payment {} ({})", provider, payment.id, payment.status);
    Ok(Json(json!({ "ok": true, "payment_id": payment.id, "status": payment.status })))
}
