pub mod admin_repo;
pub mod backup_repo;
pub mod banner_repo;
pub mod gateway_repo;
pub mod notification_repo;
pub mod partner_repo;
pub mod payment_repo;
pub mod plan_repo;
pub mod remnawave_repo;
pub mod subscription_repo;
pub mod user_repo;
