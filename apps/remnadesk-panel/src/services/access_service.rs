use remnadesk_db::models::admin::{Admin, AdminRole};
use remnadesk_db::repositories::admin_repo::AdminRepository;
use sqlx::PgPool;

use super::is_unique_violation;
use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Admin account management.
#[derive(Debug, Clone)]
pub struct AccessService {
    pool: PgPool,
    admins: AdminRepository,
}

/// What an update would change on the target account.
#[derive(Debug, Clone, Copy)]
pub struct AdminChange {
    pub role: Option<AdminRole>,
    pub is_active: Option<bool>,
    pub delete: bool,
}

/// Rejects changes that lock the panel out: touching your own superadmin
/// rights, or removing the last active superadmin.
pub fn check_admin_change(
    actor_id: i64,
    target: &Admin,
    change: AdminChange,
    active_superadmins: i64,
) -> AppResult<()> {
    let target_is_super = target.role() == AdminRole::Superadmin && target.is_active;
    let loses_super = change.delete
        || change.is_active == Some(false)
        || change.role.is_some_and(|r| r != AdminRole::Superadmin);

    if !target_is_super || !loses_super {
        return Ok(());
    }
    if target.id == actor_id {
        return Err(AppError::BadRequest(
            "You cannot demote, deactivate or delete your own account".into(),
        ));
    }
    if active_superadmins <= 1 {
        return Err(AppError::Conflict(
            "The last active superadmin cannot be removed".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))
}

impl AccessService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            admins: AdminRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn find(&self, id: i64) -> AppResult<Option<Admin>> {
        Ok(self.admins.get_by_id(id).await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<Admin> {
        self.find(id).await?.ok_or_else(|| AppError::not_found("Admin"))
    }

    pub async fn list(&self) -> AppResult<Vec<Admin>> {
        Ok(self.admins.list().await?)
    }

    pub async fn create(&self, username: &str, password: &str, role: AdminRole) -> AppResult<Admin> {
        let username = username.trim();
        if username.len() < 3 || username.len() > 64 {
            return Err(AppError::BadRequest("Username must be 3 to 64 characters".into()));
        }
        validate_password(password)?;
        if self.admins.username_exists(username).await? {
            return Err(AppError::Conflict(format!("Admin '{}' already exists", username)));
        }
        let hash = hash_password(password)?;
        match self.admins.create(username, &hash, role.as_str()).await {
            Ok(admin) => Ok(admin),
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::Conflict(format!("Admin '{}' already exists", username)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Applies a role or status change. The superadmin set is locked before
    /// the guard runs, so concurrent demotions are serialized.
    pub async fn update(
        &self,
        actor_id: i64,
        id: i64,
        role: Option<AdminRole>,
        is_active: Option<bool>,
    ) -> AppResult<Admin> {
        let mut tx = self.pool.begin().await?;
        let active_superadmins = AdminRepository::lock_active_superadmins(&mut *tx).await?;
        let target = AdminRepository::lock(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found("Admin"))?;
        let change = AdminChange {
            role,
            is_active,
            delete: false,
        };
        check_admin_change(actor_id, &target, change, active_superadmins)?;

        let admin = AdminRepository::update(&mut *tx, id, role.map(|r| r.as_str()), is_active)
            .await?
            .ok_or_else(|| AppError::not_found("Admin"))?;
        tx.commit().await?;
        Ok(admin)
    }

    pub async fn reset_password(&self, id: i64, password: &str) -> AppResult<Admin> {
        validate_password(password)?;
        let admin = self.get(id).await?;
        let hash = hash_password(password)?;
        self.admins.set_password(&admin.username, &hash).await?;
        Ok(admin)
    }

    pub async fn delete(&self, actor_id: i64, id: i64) -> AppResult<Admin> {
        let mut tx = self.pool.begin().await?;
        let active_superadmins = AdminRepository::lock_active_superadmins(&mut *tx).await?;
        let target = AdminRepository::lock(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::not_found("Admin"))?;
        let change = AdminChange {
            role: None,
            is_active: None,
            delete: true,
        };
        check_admin_change(actor_id, &target, change, active_superadmins)?;

        if !AdminRepository::delete(&mut *tx, id).await? {
            return Err(AppError::not_found("Admin"));
        }
        tx.commit().await?;
        Ok(target)
    }

    /// CLI: create the admin, or reset its password if the username exists.
    pub async fn upsert_from_cli(&self, username: &str, password: &str, role: AdminRole) -> AppResult<bool> {
        validate_password(password)?;
        let hash = hash_password(password)?;
        if self.admins.set_password(username, &hash).await? {
            return Ok(false);
        }
        self.admins.create(username, &hash, role.as_str()).await?;
        Ok(true)
    }

    pub async fn reset_password_by_username(&self, username: &str, password: &str) -> AppResult<()> {
        validate_password(password)?;
        let hash = hash_password(password)?;
        if !self.admins.set_password(username, &hash).await? {
            return Err(AppError::not_found(format!("Admin '{}'", username)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn admin(id: i64, role: &str, active: bool) -> Admin {
        Admin {
            id,
            username: format!("admin{}", id),
            password_hash: String::new(),
            role: role.into(),
            is_active: active,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    const DEMOTE: AdminChange = AdminChange {
        role: Some(AdminRole::Admin),
        is_active: None,
        delete: false,
    };
    const DEACTIVATE: AdminChange = AdminChange {
        role: None,
        is_active: Some(false),
        delete: false,
    };
    const DELETE: AdminChange = AdminChange {
        role: None,
        is_active: None,
        delete: true,
    };

    #[test]
    fn superadmin_cannot_lock_themselves_out() {
        let me = admin(1, "superadmin", true);
        for change in [DEMOTE, DEACTIVATE, DELETE] {
            let err = check_admin_change(1, &me, change, 3).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
    }

    #[test]
    fn last_superadmin_is_protected() {
        let other = admin(2, "superadmin", true);
        assert!(matches!(
            check_admin_change(1, &other, DELETE, 1),
            Err(AppError::Conflict(_))
        ));
        assert!(check_admin_change(1, &other, DELETE, 2).is_ok());
    }

    #[test]
    fn harmless_changes_pass() {
        let me = admin(1, "superadmin", true);
        let keep = AdminChange {
            role: Some(AdminRole::Superadmin),
            is_active: Some(true),
            delete: false,
        };
        assert!(check_admin_change(1, &me, keep, 1).is_ok());
        assert!(check_admin_change(1, &admin(5, "support", true), DELETE, 1).is_ok());
        assert!(check_admin_change(1, &admin(6, "superadmin", false), DELETE, 1).is_ok());
    }

    #[test]
    fn password_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long-enough").is_ok());
    }

    async fn active_superadmins(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM admins WHERE role = 'superadmin' AND is_active = TRUE")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn concurrent_mutual_demotion_leaves_one_superadmin() {
        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let access = &state.access;
        let a = access.create("root-a", "password-a", AdminRole::Superadmin).await.unwrap();
        let b = access.create("root-b", "password-b", AdminRole::Superadmin).await.unwrap();

        for _ in 0..20 {
            sqlx::query("UPDATE admins SET role = 'superadmin', is_active = TRUE")
                .execute(&state.pool)
                .await
                .unwrap();
            let (a_demotes_b, b_demotes_a) = tokio::join!(
                access.update(a.id, b.id, Some(AdminRole::Admin), None),
                access.update(b.id, a.id, Some(AdminRole::Admin), None),
            );
            assert_ne!(a_demotes_b.is_ok(), b_demotes_a.is_ok());
            let loser = if a_demotes_b.is_ok() { b_demotes_a } else { a_demotes_b };
            assert!(matches!(loser, Err(AppError::Conflict(_))));
            assert_eq!(active_superadmins(&state.pool).await, 1);
        }
    }

    #[tokio::test]
    async fn concurrent_deactivate_and_delete_leave_one_superadmin() {
        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let access = &state.access;
        let a = access.create("root-a", "password-a", AdminRole::Superadmin).await.unwrap();
        let b = access.create("root-b", "password-b", AdminRole::Superadmin).await.unwrap();

        let (deactivated, deleted) = tokio::join!(
            access.update(a.id, b.id, None, Some(false)),
            access.delete(b.id, a.id),
        );
        assert_ne!(deactivated.is_ok(), deleted.is_ok());
        assert_eq!(active_superadmins(&state.pool).await, 1);
    }

    #[tokio::test]
    async fn duplicate_admin_usernames_conflict() {
        let Some(state) = crate::state::database_state().await else {
            return;
        };
        let (first, second) = tokio::join!(
            state.access.create("operator", "password-1", AdminRole::Admin),
            state.access.create("operator", "password-2", AdminRole::Support),
        );
        assert_ne!(first.is_ok(), second.is_ok());
        let failed = if first.is_ok() { second } else { first };
        assert!(matches!(failed, Err(AppError::Conflict(_))));

        let again = state.access.create(" operator ", "password-3", AdminRole::Admin).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }
}
