use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderMap;
use remnadesk_db::models::gateway::{Gateway, GatewayProvider};
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::models::payment::{Payment, PaymentStatus};
use remnadesk_db::models::plan::Plan;
use remnadesk_db::repositories::payment_repo::PaymentRepository;
use remnadesk_db::repositories::plan_repo::PlanRepository;
use remnadesk_db::repositories::user_repo::UserRepository;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};

use super::gateway_service::{GatewayService, Quote, quote};
use super::partner_service::PartnerService;
use super::payment::{Invoice, PaymentAdapter, WebhookOutcome, adapter_for};
use super::referral_service::ReferralService;
use super::subscription_service::SubscriptionService;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct Checkout {
    pub payment: Payment,
    pub quote: Quote,
    pub payment_url: String,
}

pub struct PaymentService {
    pool: PgPool,
    payments: PaymentRepository,
    plans: PlanRepository,
    users: UserRepository,
    gateways: Arc<GatewayService>,
    partners: Arc<PartnerService>,
    referrals: Arc<ReferralService>,
    subscriptions: Arc<SubscriptionService>,
    public_url: String,
    http: reqwest::Client,
}

impl PaymentService {
    pub fn new(
        pool: PgPool,
        gateways: Arc<GatewayService>,
        partners: Arc<PartnerService>,
        referrals: Arc<ReferralService>,
        subscriptions: Arc<SubscriptionService>,
        public_url: String,
        http: reqwest::Client,
    ) -> Self {
        Self {
            payments: PaymentRepository::new(pool.clone()),
            plans: PlanRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            pool,
            gateways,
            partners,
            referrals,
            subscriptions,
            public_url,
            http,
        }
    }

    fn adapter(&self, gateway: &Gateway) -> AppResult<Box<dyn PaymentAdapter>> {
        adapter_for(gateway, &self.public_url, self.http.clone()).map_err(AppError::Internal)
    }

    pub async fn get(&self, id: i64) -> AppResult<Payment> {
        self.payments
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment"))
    }

    pub async fn list(
        &self,
        status: Option<PaymentStatus>,
        user_id: Option<i64>,
        page: &Pagination,
    ) -> AppResult<Page<Payment>> {
        let (rows, total) = self
            .payments
            .list(status.map(|s| s.as_str()), user_id, page)
            .await?;
        Ok(Page::new(rows, total, page))
    }

    /// Opens a pending payment for `plan_id` and returns the checkout URL.
    pub async fn create_payment(&self, user_id: i64, plan_id: i64, gateway_id: Option<i64>) -> AppResult<Checkout> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        if user.is_banned {
            return Err(AppError::Forbidden("Account is banned".into()));
        }

        let plan = self
            .plans
            .get_by_id(plan_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::not_found("Plan"))?;

        let gateway = match gateway_id {
            Some(id) => self.gateways.get(id).await?,
            None => self.gateways.default_gateway().await?,
        };
        if !gateway.is_active {
            return Err(AppError::BadRequest("Gateway is not available".into()));
        }
        if !gateway.currency.eq_ignore_ascii_case(&plan.currency) {
            return Err(AppError::BadRequest(format!(
                "Gateway accepts {} but the plan is priced in {}",
                gateway.currency, plan.currency
            )));
        }

        let quote = quote(&gateway, plan.price)?;
        let mut payment = self
            .payments
            .create(user.id, gateway.id, Some(plan.id), quote.amount, quote.fee, &quote.currency)
            .await?;

        let invoice = Invoice {
            payment_id: payment.id,
            total: quote.total,
            currency: quote.currency.clone(),
            description: plan.name.clone(),
        };
        let adapter = self.adapter(&gateway)?;
        let url = match adapter.create_invoice(&invoice).await {
            Ok(url) => url,
            Err(e) => {
                error!("{} invoice for payment {} failed: {:#}", adapter.name(), payment.id, e);
                self.payments
                    .close_pending(payment.id, PaymentStatus::Failed.as_str())
                    .await?;
                return Err(AppError::Upstream(format!("{} is unavailable", gateway.name)));
            }
        };
        self.payments.set_payment_url(payment.id, &url).await?;
        payment.payment_url = Some(url.clone());

        info!(
            "Payment {} opened: user {} plan {} via {} ({} + {} {})",
            payment.id, user.id, plan.id, gateway.name, quote.amount, quote.fee, quote.currency
        );
        Ok(Checkout {
            payment,
            quote,
            payment_url: url,
        })
    }

    /// Marks the payment completed and applies its effects in one transaction:
    /// subscription, partner commission and referral rewards. Completing an
    /// already completed payment returns it unchanged.
    pub async fn complete_payment(&self, id: i64, external_id: Option<&str>) -> AppResult<Payment> {
        let mut tx = self.pool.begin().await?;
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock payment")?
            .ok_or_else(|| AppError::not_found("Payment"))?;

        match payment.status() {
            PaymentStatus::Completed => return Ok(payment),
            PaymentStatus::Failed | PaymentStatus::Cancelled => {
                return Err(AppError::Conflict(format!("Payment is {}", payment.status)));
            }
            PaymentStatus::Pending => {}
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'completed', completed_at = CURRENT_TIMESTAMP, external_id = COALESCE($2, external_id)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(external_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to complete payment")?;

        let mut activated = None;
        if let Some(plan_id) = payment.plan_id {
            let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
                .bind(plan_id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to load plan for payment")?;
            match plan {
                Some(plan) => {
                    let sub =
                        SubscriptionService::activate_in_tx(&mut *tx, payment.user_id, &plan, plan.duration_days)
                            .await?;
                    activated = Some((sub, plan));
                }
                None => warn!("Payment {} references missing plan {}", id, plan_id),
            }
        }

        let earning = self
            .partners
            .record_earning(&mut *tx, payment.user_id, payment.id, payment.amount)
            .await?;
        let rewards = self
            .referrals
            .distribute_rewards(&mut *tx, payment.user_id, payment.id, payment.amount)
            .await?;
        tx.commit().await?;

        info!(
            "Payment {} completed: partner earning {}, {} referral rewards",
            payment.id,
            earning.map(|e| e.amount).unwrap_or(0),
            rewards.len()
        );

        if let Some((sub, plan)) = activated {
            self.subscriptions.provision(&sub, &plan).await;
        }
        Ok(payment)
    }

    pub async fn fail_payment(&self, id: i64) -> AppResult<Payment> {
        match self.payments.close_pending(id, PaymentStatus::Failed.as_str()).await? {
            Some(payment) => Ok(payment),
            None => {
                let payment = self.get(id).await?;
                Err(AppError::Conflict(format!("Payment is already {}", payment.status)))
            }
        }
    }

    /// Verifies and applies a provider callback. The signature is checked
    /// against each active gateway of that provider until one matches.
    pub async fn handle_webhook(&self, provider: &str, headers: &HeaderMap, body: &str) -> AppResult<Payment> {
        let provider: GatewayProvider = provider.parse()?;
        let gateways = self.gateways.active_by_provider(provider).await?;
        if gateways.is_empty() {
            return Err(AppError::NotFound(format!("No active {} gateway", provider)));
        }

        let mut matched = None;
        for gateway in gateways {
            let adapter = match self.adapter(&gateway) {
                Ok(a) => a,
                Err(e) => {
                    warn!("Skipping misconfigured gateway {}: {}", gateway.id, e);
                    continue;
                }
            };
            let signature = headers
                .get(adapter.signature_header())
                .and_then(|v| v.to_str().ok());
            if adapter.verify_signature(body, signature).is_ok() {
                matched = Some((gateway, adapter));
                break;
            }
        }
        let Some((gateway, adapter)) = matched else {
            warn!("Rejected {} webhook with invalid signature", provider);
            return Err(AppError::Unauthorized("Invalid webhook signature".into()));
        };

        let event = adapter
            .parse_webhook(body)
            .map_err(|e| AppError::BadRequest(format!("Malformed webhook: {}", e)))?;
        let payment = self.get(event.payment_id).await?;
        if payment.gateway_id != gateway.id {
            return Err(AppError::BadRequest("Payment does not belong to this gateway".into()));
        }

        match event.outcome {
            WebhookOutcome::Paid => self.complete_payment(payment.id, event.external_id.as_deref()).await,
            WebhookOutcome::Failed if payment.status() == PaymentStatus::Pending => self.fail_payment(payment.id).await,
            _ => Ok(payment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::{PLAN_PRICE, balance, pending_payment, register, storefront};
    use crate::state::database_state;

    async fn count(pool: &PgPool, sql: &str, id: i64) -> i64 {
        sqlx::query_scalar(sql).bind(id).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn completion_rewards_three_referral_levels_once() {
        let Some(state) = database_state().await else {
            return;
        };
        let (plan, _) = storefront(&state).await;
        let root = register(&state, 1001, None).await;
        let upper = register(&state, 1002, Some(&root.referral_code)).await;
        let inviter = register(&state, 1003, Some(&format!("ref_{}", upper.referral_code))).await;
        let payer = register(&state, 1004, Some(&inviter.referral_code)).await;

        let chain: Vec<(i64, i16)> =
            sqlx::query_as("SELECT referrer_id, level FROM referrals WHERE referred_id = $1 ORDER BY level")
                .bind(payer.id)
                .fetch_all(&state.pool)
                .await
                .unwrap();
        assert_eq!(chain, vec![(inviter.id, 1), (upper.id, 2), (root.id, 3)]);

        let payment = pending_payment(&state, payer.id, &plan).await;
        assert_eq!(payment.amount, PLAN_PRICE);
        assert_eq!(payment.payment_url.as_deref(), Some(format!("https://panel.example.com/pay/{}", payment.id).as_str()));

        let done = state.payments.complete_payment(payment.id, Some("ext-1")).await.unwrap();
        assert_eq!(done.status(), PaymentStatus::Completed);
        assert_eq!(done.external_id.as_deref(), Some("ext-1"));

        let again = state.payments.complete_payment(payment.id, Some("ext-2")).await.unwrap();
        assert_eq!(again.status(), PaymentStatus::Completed);
        assert_eq!(again.external_id.as_deref(), Some("ext-1"));

        assert_eq!(balance(&state, inviter.id).await, 1000);
        assert_eq!(balance(&state, upper.id).await, 500);
        assert_eq!(balance(&state, root.id).await, 200);
        assert_eq!(balance(&state, payer.id).await, 0);
        assert_eq!(
            count(&state.pool, "SELECT COUNT(*) FROM referral_rewards WHERE payment_id = $1", payment.id).await,
            3
        );
        assert_eq!(
            count(&state.pool, "SELECT COUNT(*) FROM subscriptions WHERE user_id = $1", payer.id).await,
            1
        );
    }

    #[tokio::test]
    async fn concurrent_completions_apply_effects_once() {
        let Some(state) = database_state().await else {
            return;
        };
        let (plan, _) = storefront(&state).await;
        let inviter = register(&state, 2001, None).await;
        let payer = register(&state, 2002, Some(&inviter.referral_code)).await;
        let payment = pending_payment(&state, payer.id, &plan).await;

        let (first, second) = tokio::join!(
            state.payments.complete_payment(payment.id, None),
            state.payments.complete_payment(payment.id, None),
        );
        assert_eq!(first.unwrap().status(), PaymentStatus::Completed);
        assert_eq!(second.unwrap().status(), PaymentStatus::Completed);
        assert_eq!(balance(&state, inviter.id).await, 1000);
    }

    #[tokio::test]
    async fn failed_payments_cannot_be_completed() {
        let Some(state) = database_state().await else {
            return;
        };
        let (plan, _) = storefront(&state).await;
        let payer = register(&state, 3001, None).await;
        let payment = pending_payment(&state, payer.id, &plan).await;

        let failed = state.payments.fail_payment(payment.id).await.unwrap();
        assert_eq!(failed.status(), PaymentStatus::Failed);
        assert!(matches!(
            state.payments.complete_payment(payment.id, None).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(state.payments.fail_payment(payment.id).await, Err(AppError::Conflict(_))));
        assert!(matches!(
            state.payments.complete_payment(payment.id + 1000, None).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            count(&state.pool, "SELECT COUNT(*) FROM subscriptions WHERE user_id = $1", payer.id).await,
            0
        );
    }
}
