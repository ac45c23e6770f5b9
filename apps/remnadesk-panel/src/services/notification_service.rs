use chrono::Utc;
use remnadesk_db::models::notification::{Notification, NotificationInput, NotificationKind, UserNotification};
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::repositories::notification_repo::NotificationRepository;
use remnadesk_db::repositories::user_repo::UserRepository;
use sqlx::PgPool;
use tracing::info;

use super::require_non_empty;
use crate::error::{AppError, AppResult};

pub const FEED_LIMIT: i64 = 50;
const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct NotificationService {
    notifications: NotificationRepository,
    users: UserRepository,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            notifications: NotificationRepository::new(pool.clone()),
            users: UserRepository::new(pool),
        }
    }

    /// Sends to one user, or to everyone when `user_id` is empty.
    pub async fn create(&self, input: &NotificationInput, created_by: Option<i64>) -> AppResult<Notification> {
        require_non_empty(&input.title, "title")?;
        require_non_empty(&input.message, "message")?;
        if input.title.trim().chars().count() > MAX_TITLE_LEN {
            return Err(AppError::BadRequest(format!(
                "title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        let kind = match input.kind.as_deref() {
            Some(k) => k.parse::<NotificationKind>()?,
            None => NotificationKind::Info,
        };
        if input.expires_at.is_some_and(|e| e <= Utc::now()) {
            return Err(AppError::BadRequest("expires_at must be in the future".into()));
        }
        if let Some(user_id) = input.user_id
            && self.users.get_by_id(user_id).await?.is_none()
        {
            return Err(AppError::not_found("User"));
        }

        let n = self
            .notifications
            .create(
                input.title.trim(),
                input.message.trim(),
                kind.as_str(),
                input.user_id,
                created_by,
                input.expires_at,
            )
            .await?;
        match n.user_id {
            Some(uid) => info!("Notification {} sent to user {}", n.id, uid),
            None => info!("Notification {} broadcast", n.id),
        }
        Ok(n)
    }

    pub async fn list(&self, page: &Pagination) -> AppResult<Page<Notification>> {
        let (rows, total) = self.notifications.list(page).await?;
        Ok(Page::new(rows, total, page))
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if !self.notifications.delete(id).await? {
            return Err(AppError::not_found("Notification"));
        }
        Ok(())
    }

    pub async fn feed(&self, user_id: i64) -> AppResult<Vec<UserNotification>> {
        Ok(self.notifications.feed(user_id, FEED_LIMIT).await?)
    }

    pub async fn mark_read(&self, notification_id: i64, user_id: i64) -> AppResult<()> {
        if !self.notifications.mark_read(notification_id, user_id).await? {
            return Err(AppError::not_found("Notification"));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: i64) -> AppResult<u64> {
        Ok(self.notifications.mark_all_read(user_id).await?)
    }

    pub async fn unread_count(&self, user_id: i64) -> AppResult<i64> {
        Ok(self.notifications.unread_count(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> NotificationService {
        let pool = PgPool::connect_lazy("postgres://localhost:1/none").unwrap();
        NotificationService::new(pool)
    }

    fn input() -> NotificationInput {
        NotificationInput {
            title: "Maintenance".into(),
            message: "Nodes restart at 03:00 UTC".into(),
            kind: Some("warning".into()),
            user_id: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_forms_before_touching_the_database() {
        let svc = service();

        let mut n = input();
        n.title = " ".into();
        assert!(matches!(svc.create(&n, None).await, Err(AppError::BadRequest(_))));

        let mut n = input();
        n.kind = Some("spam".into());
        assert!(matches!(svc.create(&n, None).await, Err(AppError::BadRequest(_))));

        let mut n = input();
        n.expires_at = Some(Utc::now() - Duration::minutes(1));
        assert!(matches!(svc.create(&n, None).await, Err(AppError::BadRequest(_))));

        let mut n = input();
        n.title = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(svc.create(&n, None).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn unread_count_follows_reads() {
        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let user = crate::services::fixtures::register(&state, 8001, None).await;
        let other = crate::services::fixtures::register(&state, 8002, None).await;
        let notice = |user_id| NotificationInput {
            title: "Maintenance".into(),
            message: "Nodes restart at 03:00 UTC".into(),
            kind: None,
            user_id,
            expires_at: None,
        };
        let direct = state.notifications.create(&notice(Some(user.id)), None).await.unwrap();
        state.notifications.create(&notice(None), None).await.unwrap();
        state.notifications.create(&notice(Some(other.id)), None).await.unwrap();

        assert_eq!(state.notifications.unread_count(user.id).await.unwrap(), 2);
        state.notifications.mark_read(direct.id, user.id).await.unwrap();
        assert_eq!(state.notifications.unread_count(user.id).await.unwrap(), 1);
        state.notifications.mark_all_read(user.id).await.unwrap();
        assert_eq!(state.notifications.unread_count(user.id).await.unwrap(), 0);
        assert_eq!(state.notifications.unread_count(other.id).await.unwrap(), 2);
    }
}

