use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

text_enum!(BannerPlacement, "banner placement", {
    Home => "home",
    Dashboard => "dashboard",
    Sidebar => "sidebar",
});

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Banner {
    pub id: i64,
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub placement: String,
    pub sort_order: i32,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Banner {
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.is_none_or(|s| s <= now)
            && self.ends_at.is_none_or(|e| e > now)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BannerInput {
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub placement: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn banner(starts: Option<i64>, ends: Option<i64>, active: bool) -> Banner {
        let now = Utc::now();
        Banner {
            id: 1,
            title: "Spring sale".into(),
            image_url: "https://cdn.example/b.png".into(),
            link_url: None,
            placement: "home".into(),
            sort_order: 0,
            is_active: active,
            starts_at: starts.map(|h| now + Duration::hours(h)),
            ends_at: ends.map(|h| now + Duration::hours(h)),
            created_at: now,
        }
    }

    #[test]
    fn visibility_window() {
        let now = Utc::now();
        assert!(banner(None, None, true).is_visible_at(now));
        assert!(banner(Some(-1), Some(1), true).is_visible_at(now));
        assert!(!banner(Some(1), None, true).is_visible_at(now));
        assert!(!banner(None, Some(-1), true).is_visible_at(now));
        assert!(!banner(None, None, false).is_visible_at(now));
    }
}
