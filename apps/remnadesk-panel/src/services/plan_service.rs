use remnadesk_db::models::plan::{Plan, PlanInput};
use remnadesk_db::repositories::plan_repo::PlanRepository;
use sqlx::PgPool;

use super::{is_foreign_key_violation, normalize_currency, require_non_empty};
use crate::error::{AppError, AppResult};

/// Checks a plan form and returns it with the currency normalized.
pub fn validate_plan(input: &PlanInput) -> AppResult<PlanInput> {
    require_non_empty(&input.name, "name")?;
    if input.price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if input.duration_days <= 0 {
        return Err(AppError::BadRequest("duration_days must be positive".into()));
    }
    if input.traffic_limit_gb.is_some_and(|t| t < 0) {
        return Err(AppError::BadRequest("traffic_limit_gb must not be negative".into()));
    }
    if input.device_limit.is_some_and(|d| d < 1) {
        return Err(AppError::BadRequest("device_limit must be at least 1".into()));
    }

    let mut normalized = input.clone();
    normalized.currency = Some(normalize_currency(input.currency.as_deref())?);
    Ok(normalized)
}

#[derive(Debug, Clone)]
pub struct PlanService {
    plans: PlanRepository,
}

impl PlanService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            plans: PlanRepository::new(pool),
        }
    }

    pub async fn list(&self, only_active: bool) -> AppResult<Vec<Plan>> {
        Ok(self.plans.list(only_active).await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<Plan> {
        self.plans
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Plan"))
    }

    pub async fn create(&self, input: &PlanInput) -> AppResult<Plan> {
        let input = validate_plan(input)?;
        Ok(self.plans.create(&input).await?)
    }

    pub async fn update(&self, id: i64, input: &PlanInput) -> AppResult<Plan> {
        let input = validate_plan(input)?;
        self.plans
            .update(id, &input)
            .await?
            .ok_or_else(|| AppError::not_found("Plan"))
    }

    pub async fn delete(&self, id: i64) -> AppResult<Plan> {
        let plan = self.get(id).await?;
        let active = self.plans.count_active_subscriptions(id).await?;
        if active > 0 {
            return Err(AppError::Conflict(format!(
                "Plan has {} active subscriptions; deactivate it instead",
                active
            )));
        }
        // Expired and cancelled subscriptions still reference the plan.
        match self.plans.delete(id).await {
            Ok(_) => Ok(plan),
            Err(e) if is_foreign_key_violation(&e) => Err(AppError::Conflict(
                "Plan is referenced by past subscriptions; deactivate it instead".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PlanInput {
        PlanInput {
            name: "Monthly".into(),
            description: None,
            price: 499,
            currency: Some("usd".into()),
            duration_days: 30,
            traffic_limit_gb: Some(100),
            device_limit: Some(3),
            is_active: None,
            sort_order: None,
        }
    }

    #[test]
    fn accepts_and_normalizes() {
        let plan = validate_plan(&input()).unwrap();
        assert_eq!(plan.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn rejects_bad_fields() {
        let mut p = input();
        p.price = -1;
        assert!(validate_plan(&p).is_err());

        let mut p = input();
        p.duration_days = 0;
        assert!(validate_plan(&p).is_err());

        let mut p = input();
        p.name = "  ".into();
        assert!(validate_plan(&p).is_err());

        let mut p = input();
        p.device_limit = Some(0);
        assert!(validate_plan(&p).is_err());
    }

    #[test]
    fn free_plans_are_allowed() {
        let mut p = input();
        p.price = 0;
        assert!(validate_plan(&p).is_ok());
    }
}
