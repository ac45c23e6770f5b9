//! Admin JSON API. Everything except login sits behind `require_admin`;
//! handlers check the write/system role themselves.

pub mod auth;
pub mod backups;
pub mod billing;
pub mod catalog;
pub mod content;
pub mod partners;
pub mod remnawave;
pub mod stats;
pub mod system;
pub mod users;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};

use crate::auth::require_admin;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        // users
        .route("/users", get(users::list))
        .route("/users/{id}", get(users::get).patch(users::update))
        .route("/users/{id}/balance", post(users::adjust_balance))
        .route("/users/{id}/subscriptions", get(users::subscriptions).post(users::grant_subscription))
        .route("/users/{id}/remnawave/sync", post(users::sync_remnawave))
        // plans and subscriptions
        .route("/plans", get(catalog::list_plans).post(catalog::create_plan))
        .route(
            "/plans/{id}",
            get(catalog::get_plan).put(catalog::update_plan).delete(catalog::delete_plan),
        )
        .route("/subscriptions/{id}/extend", post(catalog::extend_subscription))
        .route("/subscriptions/{id}/cancel", post(catalog::cancel_subscription))
        // partners and referrals
        .route("/partners", get(partners::list).post(partners::enroll))
        .route("/partners/stats", get(partners::stats))
        .route("/partners/{id}", get(partners::get).patch(partners::update))
        .route("/payouts", get(partners::list_payouts))
        .route("/payouts/{id}/complete", post(partners::complete_payout))
        .route("/payouts/{id}/reject", post(partners::reject_payout))
        .route("/referrals", get(partners::list_referrals))
        .route("/referrals/leaderboard", get(partners::leaderboard))
        // billing
        .route("/gateways", get(billing::list_gateways).post(billing::create_gateway))
        .route(
            "/gateways/{id}",
            get(billing::get_gateway)
                .put(billing::update_gateway)
                .delete(billing::delete_gateway),
        )
        .route("/gateways/{id}/default", post(billing::set_default_gateway))
        .route("/payments", get(billing::list_payments))
        .route("/payments/{id}", get(billing::get_payment))
        .route("/payments/{id}/complete", post(billing::complete_payment))
        .route("/payments/{id}/fail", post(billing::fail_payment))
        // content
        .route(
            "/notifications",
            get(content::list_notifications).post(content::create_notification),
        )
        .route("/notifications/{id}", delete(content::delete_notification))
        .route("/banners", get(content::list_banners).post(content::create_banner))
        .route("/banners/reorder", post(content::reorder_banners))
        .route(
            "/banners/{id}",
            get(content::get_banner)
                .put(content::update_banner)
                .delete(content::delete_banner),
        )
        // statistics
        .route("/stats/overview", get(stats::overview))
        .route("/stats/revenue", get(stats::revenue))
        .route("/stats/registrations", get(stats::registrations))
        .route("/stats/top-plans", get(stats::top_plans))
        // backups
        .route("/backups", get(backups::list).post(backups::create))
        .route("/backups/{id}", get(backups::get).delete(backups::delete))
        .route("/backups/{id}/download", get(backups::download))
        // remnawave
        .route("/remnawave/sync", post(remnawave::sync_all))
        .route("/remnawave/links/{id}", delete(remnawave::unlink))
        .route("/remnawave/stats", get(remnawave::system_stats))
        // system
        .route("/admins", get(system::list_admins).post(system::create_admin))
        .route("/admins/{id}", patch(system::update_admin).delete(system::delete_admin))
        .route("/admins/{id}/password", post(system::reset_password))
        .route("/settings", get(system::get_settings).put(system::update_settings))
        .route("/logs", get(system::logs))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    Router::new()
        .route("/auth/login", post(auth::login))
        .merge(protected)
}
