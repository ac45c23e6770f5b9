use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use remnadesk_db::models::banner::Banner;
use remnadesk_db::models::gateway::Gateway;
use remnadesk_db::models::notification::UserNotification;
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::partner::PartnerPayout;
use remnadesk_db::models::payment::Payment;
use remnadesk_db::models::plan::Plan;
use remnadesk_db::models::referral::UserReferralStats;
use remnadesk_db::models::remnawave::RemnawaveLink;
use remnadesk_db::models::subscription::SubscriptionWithPlan;
use remnadesk_db::models::user::{User, UserUpdate};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{ClientClaims, require_client};
use crate::error::{AppError, AppResult};
use crate::services::auth_service::ClientLogin;
use crate::services::client_service::ClientDashboard;
use crate::services::partner_service::PartnerDetails;
use crate::services::payment_service::Checkout;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/profile", get(profile).patch(update_profile))
        .route("/plans", get(plans))
        .route("/gateways", get(gateways))
        .route("/subscriptions", get(subscriptions))
        .route("/banners", get(banners))
        .route("/notifications", get(notifications))
        .route("/notifications/unread", get(unread_notifications))
        .route("/notifications/read-all", post(read_all_notifications))
        .route("/notifications/{id}/read", post(read_notification))
        .route("/referrals", get(referrals))
        .route("/referrals/code", post(change_referral_code))
        .route("/partner", get(partner).post(become_partner))
        .route("/partner/payouts", get(partner_payouts).post(request_payout))
        .route("/payments", get(payments).post(create_payment))
        .route("/keys", get(keys))
        .route_layer(middleware::from_fn_with_state(state, require_client));

    Router::new()
        .route("/auth/telegram", post(auth_telegram))
        .merge(protected)
}

#[derive(Debug, Deserialize)]
pub struct TelegramAuthRequest {
    pub init_data: String,
}

async fn auth_telegram(
    State(state): State<AppState>,
    Json(req): Json<TelegramAuthRequest>,
) -> AppResult<Json<ClientLogin>> {
    Ok(Json(state.auth.auth_telegram(&req.init_data).await?))
}

async fn profile(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<ClientDashboard>> {
    Ok(Json(state.clients.dashboard(me.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub language_code: Option<String>,
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
    Json(req): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    let patch = UserUpdate {
        email: req.email,
        language_code: req.language_code,
        is_banned: None,
    };
    Ok(Json(state.clients.update(me.user_id, &patch).await?))
}

async fn plans(State(state): State<AppState>) -> AppResult<Json<Vec<Plan>>> {
    Ok(Json(state.plans.list(true).await?))
}

async fn gateways(State(state): State<AppState>) -> AppResult<Json<Vec<Gateway>>> {
    Ok(Json(state.gateways.list(false).await?))
}

async fn subscriptions(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<Vec<SubscriptionWithPlan>>> {
    Ok(Json(state.subscriptions.list_for_user(me.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BannerQuery {
    pub placement: Option<String>,
}

async fn banners(State(state): State<AppState>, Query(q): Query<BannerQuery>) -> AppResult<Json<Vec<Banner>>> {
    Ok(Json(state.banners.active(q.placement.as_deref()).await?))
}

async fn notifications(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<Vec<UserNotification>>> {
    Ok(Json(state.notifications.feed(me.user_id).await?))
}

async fn unread_notifications(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<Value>> {
    let unread = state.notifications.unread_count(me.user_id).await?;
    Ok(Json(json!({ "unread": unread })))
}

async fn read_notification(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.notifications.mark_read(id, me.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_all_notifications(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<Value>> {
    let marked = state.notifications.mark_all_read(me.user_id).await?;
    Ok(Json(json!({ "marked": marked })))
}

async fn referrals(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<UserReferralStats>> {
    Ok(Json(state.referrals.user_referrals(me.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReferralCodeRequest {
    pub code: String,
}

async fn change_referral_code(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
    Json(req): Json<ReferralCodeRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(state.referrals.update_referral_code(me.user_id, &req.code).await?))
}

async fn own_partner(state: &AppState, user_id: i64) -> AppResult<PartnerDetails> {
    let partner = state
        .partners
        .for_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("You are not a partner".into()))?;
    state.partners.details(partner).await
}

async fn partner(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<PartnerDetails>> {
    Ok(Json(own_partner(&state, me.user_id).await?))
}

async fn become_partner(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<(StatusCode, Json<PartnerDetails>)> {
    let partner = state.partners.enroll(me.user_id, None).await?;
    Ok((StatusCode::CREATED, Json(state.partners.details(partner).await?)))
}

async fn partner_payouts(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<Vec<PartnerPayout>>> {
    Ok(Json(own_partner(&state, me.user_id).await?.payouts))
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub amount: i64,
    pub method: String,
    pub destination: String,
}

async fn request_payout(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
    Json(req): Json<PayoutRequest>,
) -> AppResult<(StatusCode, Json<PartnerPayout>)> {
    let partner = state
        .partners
        .for_user(me.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("You are not a partner".into()))?;
    let payout = state
        .partners
        .request_payout(partner.id, req.amount, &req.method, &req.destination)
        .await?;
    Ok((StatusCode::CREATED, Json(payout)))
}

async fn payments(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Page<Payment>>> {
    Ok(Json(state.payments.list(None, Some(me.user_id), &page).await?))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: i64,
    pub gateway_id: Option<i64>,
}

async fn create_payment(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
    Json(req): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<Checkout>)> {
    let checkout = state
        .payments
        .create_payment(me.user_id, req.plan_id, req.gateway_id)
        .await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

async fn keys(
    State(state): State<AppState>,
    Extension(me): Extension<ClientClaims>,
) -> AppResult<Json<Vec<RemnawaveLink>>> {
    Ok(Json(state.remnawave.links_for_user(me.user_id).await?))
}
