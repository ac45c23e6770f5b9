use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

text_enum!(AdminRole, "admin role", {
    Superadmin => "superadmin",
    Admin => "admin",
    Support => "support",
});

impl AdminRole {
    /// Business data writes: plans, partners, gateways, banners and so on.
    pub fn can_write(&self) -> bool {
        matches!(self, AdminRole::Superadmin | AdminRole::Admin)
    }

    /// Admin accounts, settings and backups.
    pub fn can_manage_system(&self) -> bool {
        matches!(self, AdminRole::Superadmin)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Admin {
    pub fn role(&self) -> AdminRole {
        self.role.parse().unwrap_or(AdminRole::Support)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_capabilities() {
        assert!(AdminRole::Superadmin.can_write());
        assert!(AdminRole::Superadmin.can_manage_system());
        assert!(AdminRole::Admin.can_write());
        assert!(!AdminRole::Admin.can_manage_system());
        assert!(!AdminRole::Support.can_write());
    }

    #[test]
    fn parses_roles_case_insensitively() {
        assert_eq!("SuperAdmin".parse::<AdminRole>().unwrap(), AdminRole::Superadmin);
        assert_eq!(" support ".parse::<AdminRole>().unwrap(), AdminRole::Support);
        let err = "owner".parse::<AdminRole>().unwrap_err();
        assert_eq!(err.kind, "admin role");
        assert_eq!(err.to_string(), "unknown admin role 'owner'");
    }

    #[test]
    fn unknown_stored_role_degrades_to_support() {
        let admin = Admin {
            id: 1,
            username: "x".into(),
            password_hash: String::new(),
            role: "legacy".into(),
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        assert_eq!(admin.role(), AdminRole::Support);
    }
}
