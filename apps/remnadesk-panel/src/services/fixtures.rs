//! Builders for tests that run against `crate::state::database_state()`.

use remnadesk_db::models::gateway::{Gateway, GatewayInput};
use remnadesk_db::models::payment::Payment;
use remnadesk_db::models::plan::{Plan, PlanInput};
use remnadesk_db::models::user::User;

use super::client_service::TelegramProfile;
use crate::state::AppState;

pub const PLAN_PRICE: i64 = 10_000;

pub fn gateway_input(name: &str) -> GatewayInput {
    GatewayInput {
        name: name.into(),
        provider: "custom".into(),
        currency: Some("USD".into()),
        fee_percent: Some(0.0),
        fee_fixed: Some(0),
        min_amount: None,
        max_amount: None,
        config: None,
        is_active: None,
        sort_order: None,
    }
}

pub async fn register(state: &AppState, tg_id: i64, start_code: Option<&str>) -> User {
    let profile = TelegramProfile {
        tg_id,
        username: Some(format!("user{}", tg_id)),
        ..Default::default()
    };
    state.clients.register(&profile, start_code).await.unwrap().0
}

pub async fn balance(state: &AppState, user_id: i64) -> i64 {
    sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await
        .unwrap()
}

/// An active USD plan and a fee-free default gateway.
pub async fn storefront(state: &AppState) -> (Plan, Gateway) {
    let plan = state
        .plans
        .create(&PlanInput {
            name: "Monthly".into(),
            description: None,
            price: PLAN_PRICE,
            currency: Some("USD".into()),
            duration_days: 30,
            traffic_limit_gb: None,
            device_limit: None,
            is_active: None,
            sort_order: None,
        })
        .await
        .unwrap();
    let gateway = state.gateways.create(&gateway_input("Manual")).await.unwrap();
    let gateway = state.gateways.set_default(gateway.id).await.unwrap();
    (plan, gateway)
}

pub async fn pending_payment(state: &AppState, user_id: i64, plan: &Plan) -> Payment {
    state
        .payments
        .create_payment(user_id, plan.id, None)
        .await
        .unwrap()
        .payment
}
