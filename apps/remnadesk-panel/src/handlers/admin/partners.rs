use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::partner::{Partner, PartnerPayout, PartnerStats, PartnerStatus, PartnerSummary, PayoutStatus};
use remnadesk_db::models::referral::ReferralDetails;
use serde::{Deserialize, Deserializer};

use crate::auth::AdminClaims;
use crate::error::AppResult;
use crate::handlers::{ListQuery, optional_json};
use crate::services::partner_service::PartnerDetails;
use crate::services::referral_service::LeaderboardEntry;
use crate::state::AppState;

const DEFAULT_LEADERBOARD: i64 = 10;
const MAX_LEADERBOARD: i64 = 100;

/// Distinguishes a missing field from an explicit `null`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> AppResult<Json<Page<PartnerSummary>>> {
    let status = query.status::<PartnerStatus>()?;
    let page = state
        .partners
        .list(query.q.as_deref(), status, &query.pagination())
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub user_id: i64,
    pub commission_percent: Option<f64>,
}

pub async fn enroll(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Json(req): Json<EnrollRequest>,
) -> AppResult<(StatusCode, Json<PartnerDetails>)> {
    me.require_write()?;
    let partner = state.partners.enroll(req.user_id, req.commission_percent).await?;
    state
        .logging
        .admin(
            &me,
            "enroll_partner",
            format!("Enrolled user {} as partner {} ({})", req.user_id, partner.id, partner.code),
        )
        .await;
    Ok((StatusCode::CREATED, Json(state.partners.details(partner).await?)))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<PartnerStats>> {
    Ok(Json(state.partners.stats().await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<PartnerDetails>> {
    Ok(Json(state.partners.get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PartnerUpdate {
    /// `null` resets the partner to the global commission rate.
    #[serde(default, deserialize_with = "double_option")]
    pub commission_percent: Option<Option<f64>>,
    pub status: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    Json(req): Json<PartnerUpdate>,
) -> AppResult<Json<Partner>> {
    me.require_write()?;
    let status = req.status.as_deref().map(str::parse::<PartnerStatus>).transpose()?;
    let partner = state.partners.update(id, req.commission_percent, status).await?;
    let rate = match partner.commission_percent {
        Some(p) => format!("{}%", p),
        None => "global rate".to_string(),
    };
    state
        .logging
        .admin(
            &me,
            "update_partner",
            format!("Partner {}: status {}, commission {}", id, partner.status, rate),
        )
        .await;
    Ok(Json(partner))
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<PartnerPayout>>> {
    let status = query.status::<PayoutStatus>()?;
    Ok(Json(state.partners.list_payouts(status, &query.pagination()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PayoutDecision {
    pub note: Option<String>,
}

pub async fn complete_payout(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    body: Bytes,
) -> AppResult<Json<PartnerPayout>> {
    me.require_write()?;
    let note = optional_json::<PayoutDecision>(&body)?.note;
    let payout = state.partners.complete_payout(id, note.as_deref()).await?;
    state
        .logging
        .admin(
            &me,
            "complete_payout",
            format!("Completed payout {} of {} for partner {}", id, payout.amount, payout.partner_id),
        )
        .await;
    Ok(Json(payout))
}

pub async fn reject_payout(
    State(state): State<AppState>,
    Extension(me): Extension<AdminClaims>,
    Path(id): Path<i64>,
    body: Bytes,
) -> AppResult<Json<PartnerPayout>> {
    me.require_write()?;
    let note = optional_json::<PayoutDecision>(&body)?.note;
    let payout = state.partners.reject_payout(id, note.as_deref()).await?;
    state
        .logging
        .admin(
            &me,
            "reject_payout",
            format!("Rejected payout {} of {}, balance refunded to partner {}", id, payout.amount, payout.partner_id),
        )
        .await;
    Ok(Json(payout))
}

#[derive(Debug, Deserialize)]
pub struct ReferralQuery {
    pub level: Option<i16>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_referrals(
    State(state): State<AppState>,
    Query(query): Query<ReferralQuery>,
) -> AppResult<Json<Page<ReferralDetails>>> {
    let page = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.referrals.list(query.level, &page).await?))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<Json<Vec<LeaderboardEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD).clamp(1, MAX_LEADERBOARD);
    Ok(Json(state.referrals.leaderboard(limit).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_update_tells_null_from_missing() {
        let missing: PartnerUpdate = serde_json::from_str(r#"{"status":"active"}"#).unwrap();
        assert_eq!(missing.commission_percent, None);

        let reset: PartnerUpdate = serde_json::from_str(r#"{"commission_percent":null}"#).unwrap();
        assert_eq!(reset.commission_percent, Some(None));

        let set: PartnerUpdate = serde_json::from_str(r#"{"commission_percent":12.5}"#).unwrap();
        assert_eq!(set.commission_percent, Some(Some(12.5)));
    }
}
