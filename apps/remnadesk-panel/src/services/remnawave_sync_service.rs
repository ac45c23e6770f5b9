use std::collections::HashMap;

use anyhow::Context;
use remnadesk_db::models::plan::Plan;
use remnadesk_db::models::remnawave::{RemnawaveLink, RemnawaveLinkData};
use remnadesk_db::models::subscription::Subscription;
use remnadesk_db::repositories::remnawave_repo::RemnawaveRepository;
use remnadesk_db::repositories::subscription_repo::SubscriptionRepository;
use remnadesk_db::repositories::user_repo::UserRepository;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::remnawave::{CreateUserRequest, RemnawaveClient, RemnawaveUser, UpdateUserRequest, UserStatus};

pub const SYNC_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub matched: usize,
    pub created: usize,
    pub updated: usize,
    /// Panel users whose Telegram ID has no local user.
    pub unmatched: usize,
    /// Panel users without a Telegram ID.
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    Create { user_id: i64, data: RemnawaveLinkData },
    Update { user_id: i64, data: RemnawaveLinkData },
}

/// Decides what to write for one page of panel users. `tg_map` maps Telegram
/// IDs to local user IDs; `known` holds the UUIDs already linked.
pub fn plan_sync(
    users: &[RemnawaveUser],
    tg_map: &HashMap<i64, i64>,
    known: &HashMap<Uuid, i64>,
    report: &mut SyncReport,
) -> Vec<SyncAction> {
    let mut actions = Vec::new();
    for user in users {
        let Some(tg_id) = user.telegram_id else {
            report.skipped += 1;
            continue;
        };
        let Some(&user_id) = tg_map.get(&tg_id) else {
            report.unmatched += 1;
            continue;
        };
        report.matched += 1;
        let data = user.link_data();
        if known.contains_key(&user.uuid) {
            actions.push(SyncAction::Update { user_id, data });
        } else {
            actions.push(SyncAction::Create { user_id, data });
        }
    }
    actions
}

/// Username for a panel account created for one subscription.
pub fn provision_username(tg_id: i64, subscription_id: i64) -> String {
    format!("rd{}_{}", tg_id, subscription_id)
}

pub struct RemnawaveSyncService {
    client: Option<RemnawaveClient>,
    links: RemnawaveRepository,
    users: UserRepository,
    subscriptions: SubscriptionRepository,
}

impl RemnawaveSyncService {
    pub fn new(pool: PgPool, client: Option<RemnawaveClient>) -> Self {
        Self {
            client,
            links: RemnawaveRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> AppResult<&RemnawaveClient> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("Remnawave is not configured".into()))
    }

    fn upstream(e: anyhow::Error) -> AppError {
        error!("Remnawave request failed: {:#}", e);
        AppError::Upstream(format!("{:#}", e))
    }

    /// Updates the link for `data.remnawave_uuid` or creates it. Returns the
    /// link and whether it was created.
    async fn store_link(&self, user_id: i64, data: &RemnawaveLinkData) -> anyhow::Result<(RemnawaveLink, bool)> {
        if let Some(link) = self.links.update(user_id, data).await? {
            return Ok((link, false));
        }
        Ok((self.links.insert(user_id, data).await?, true))
    }

    /// Pulls every panel user and links those whose Telegram ID matches a
    /// local user. Stops at the first page that cannot be fetched.
    pub async fn sync_all(&self) -> AppResult<SyncReport> {
        let client = self.client()?;
        let mut report = SyncReport::default();
        let mut known: HashMap<Uuid, i64> = self.links.all_link_owners().await?.into_iter().collect();
        let mut start = 0;

        loop {
            let (users, total) = client
                .list_users(start, SYNC_PAGE_SIZE)
                .await
                .map_err(Self::upstream)?;
            let page_len = users.len() as i64;
            report.fetched += users.len();

            let mut tg_ids: Vec<i64> = users.iter().filter_map(|u| u.telegram_id).collect();
            tg_ids.sort_unstable();
            tg_ids.dedup();
            let tg_map: HashMap<i64, i64> = self.users.tg_id_map(&tg_ids).await?.into_iter().collect();

            for action in plan_sync(&users, &tg_map, &known, &mut report) {
                match action {
                    SyncAction::Create { user_id, data } => match self.store_link(user_id, &data).await {
                        Ok((_, true)) => {
                            report.created += 1;
                            known.insert(data.remnawave_uuid, user_id);
                        }
                        Ok((_, false)) => report.updated += 1,
                        Err(e) => {
                            warn!("Failed to link {} to user {}: {:#}", data.remnawave_uuid, user_id, e);
                            report.errors += 1;
                        }
                    },
                    SyncAction::Update { user_id, data } => match self.store_link(user_id, &data).await {
                        Ok(_) => report.updated += 1,
                        Err(e) => {
                            warn!("Failed to refresh link {}: {:#}", data.remnawave_uuid, e);
                            report.errors += 1;
                        }
                    },
                }
            }

            start += page_len;
            if page_len < SYNC_PAGE_SIZE || start >= total {
                break;
            }
        }

        info!(
            "Remnawave sync: fetched {}, matched {}, created {}, updated {}, unmatched {}, skipped {}, errors {}",
            report.fetched,
            report.matched,
            report.created,
            report.updated,
            report.unmatched,
            report.skipped,
            report.errors
        );
        Ok(report)
    }

    /// Links every panel account carrying the user's Telegram ID.
    pub async fn sync_user(&self, user_id: i64) -> AppResult<Vec<RemnawaveLink>> {
        let client = self.client()?;
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        let accounts = client
            .get_users_by_telegram_id(user.tg_id)
            .await
            .map_err(Self::upstream)?;
        let mut links = Vec::with_capacity(accounts.len());
        for account in &accounts {
            let (link, created) = self.store_link(user.id, &account.link_data()).await?;
            debug!("Link {} for user {} (created: {})", link.remnawave_uuid, user.id, created);
            links.push(link);
        }
        Ok(links)
    }

    pub async fn unlink(&self, link_id: i64) -> AppResult<RemnawaveLink> {
        let link = self
            .links
            .get_by_id(link_id)
            .await?
            .ok_or_else(|| AppError::not_found("Remnawave link"))?;
        self.links.delete(link_id).await?;
        Ok(link)
    }

    pub async fn links_for_user(&self, user_id: i64) -> AppResult<Vec<RemnawaveLink>> {
        Ok(self.links.links_for_user(user_id).await?)
    }

    /// Creates or extends the panel account backing a subscription.
    pub async fn provision(&self, sub: &Subscription, plan: &Plan) -> anyhow::Result<RemnawaveLink> {
        let client = self.client.as_ref().context("Remnawave is not configured")?;
        let user = self
            .users
            .get_by_id(sub.user_id)
            .await?
            .context("Subscription owner not found")?;

        // An account removed on the panel side is created again.
        let existing = match sub.remnawave_uuid {
            Some(uuid) => client.get_user(uuid).await?,
            None => None,
        };
        let account = match existing {
            Some(current) => {
                client
                    .update_user(&UpdateUserRequest {
                        uuid: current.uuid,
                        expire_at: Some(sub.expires_at),
                        traffic_limit_bytes: Some(plan.traffic_limit_bytes()),
                        status: Some(UserStatus::Active),
                    })
                    .await?
            }
            None => {
                let account = client
                    .create_user(&CreateUserRequest {
                        username: provision_username(user.tg_id, sub.id),
                        expire_at: sub.expires_at,
                        traffic_limit_bytes: plan.traffic_limit_bytes(),
                        traffic_limit_strategy: "NO_RESET".to_string(),
                        status: UserStatus::Active,
                        telegram_id: Some(user.tg_id),
                        description: Some(format!("{} / {}", user.display_name(), plan.name)),
                    })
                    .await?;
                self.subscriptions.set_remnawave_uuid(sub.id, account.uuid).await?;
                account
            }
        };

        let (link, created) = self.store_link(user.id, &account.link_data()).await?;
        info!(
            "Provisioned Remnawave user {} for subscription {} (new: {})",
            account.uuid, sub.id, created
        );
        Ok(link)
    }

    /// Disables the panel account of a cancelled subscription, if it has one.
    pub async fn disable(&self, sub: &Subscription) -> anyhow::Result<()> {
        let (Some(client), Some(uuid)) = (self.client.as_ref(), sub.remnawave_uuid) else {
            return Ok(());
        };
        let account = client
            .update_user(&UpdateUserRequest {
                uuid,
                status: Some(UserStatus::Disabled),
                ..Default::default()
            })
            .await?;
        self.store_link(sub.user_id, &account.link_data()).await?;
        Ok(())
    }

    pub async fn system_stats(&self) -> AppResult<serde_json::Value> {
        self.client()?.system_stats().await.map_err(Self::upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel_user(uuid: u128, tg: Option<i64>) -> RemnawaveUser {
        RemnawaveUser {
            uuid: Uuid::from_u128(uuid),
            short_uuid: None,
            username: format!("u{}", uuid),
            status: Some("ACTIVE".into()),
            telegram_id: tg,
            subscription_url: None,
            traffic_limit_bytes: Some(0.0),
            used_traffic_bytes: None,
            expire_at: None,
        }
    }

    #[test]
    fn classifies_panel_users() {
        let users = vec![
            panel_user(1, Some(100)),
            panel_user(2, Some(100)),
            panel_user(3, Some(200)),
            panel_user(4, None),
        ];
        let tg_map = HashMap::from([(100, 10)]);
        let known = HashMap::from([(Uuid::from_u128(2), 10)]);
        let mut report = SyncReport::default();

        let actions = plan_sync(&users, &tg_map, &known, &mut report);

        assert_eq!(report.matched, 2);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], SyncAction::Create { user_id: 10, data } if data.remnawave_uuid == Uuid::from_u128(1)));
        assert!(matches!(&actions[1], SyncAction::Update { user_id: 10, .. }));
    }

    #[test]
    fn usernames_embed_telegram_and_subscription() {
        assert_eq!(provision_username(123456, 9), "rd123456_9");
    }

    #[tokio::test]
    async fn unconfigured_service_refuses_sync() {
        let pool = PgPool::connect_lazy("postgres://localhost:1/none").unwrap();
        let svc = RemnawaveSyncService::new(pool, None);
        assert!(!svc.is_configured());
        assert!(matches!(svc.sync_all().await, Err(AppError::BadRequest(_))));
        assert!(matches!(svc.system_stats().await, Err(AppError::BadRequest(_))));
    }
}
