use std::collections::HashSet;

use chrono::Utc;
use remnadesk_db::models::banner::{Banner, BannerInput, BannerPlacement};
use remnadesk_db::repositories::banner_repo::BannerRepository;
use sqlx::PgPool;

use super::require_non_empty;
use crate::error::{AppError, AppResult};

/// Checks a banner form and returns its placement.
pub fn validate_banner(input: &BannerInput) -> AppResult<BannerPlacement> {
    require_non_empty(&input.title, "title")?;
    require_non_empty(&input.image_url, "image_url")?;
    for (field, value) in [("image_url", Some(&input.image_url)), ("link_url", input.link_url.as_ref())] {
        if let Some(v) = value.map(|v| v.trim()).filter(|v| !v.is_empty())
            && url::Url::parse(v).is_err()
        {
            return Err(AppError::BadRequest(format!("{} is not a valid URL", field)));
        }
    }
    if let (Some(starts), Some(ends)) = (input.starts_at, input.ends_at)
        && ends <= starts
    {
        return Err(AppError::BadRequest("ends_at must be after starts_at".into()));
    }
    Ok(match input.placement.as_deref() {
        Some(p) => p.parse()?,
        None => BannerPlacement::Home,
    })
}

fn check_order(ids: &[i64]) -> AppResult<()> {
    if ids.is_empty() {
        return Err(AppError::BadRequest("ids must not be empty".into()));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    if !ids.iter().all(|id| seen.insert(*id)) {
        return Err(AppError::BadRequest("ids must not repeat".into()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BannerService {
    banners: BannerRepository,
}

impl BannerService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            banners: BannerRepository::new(pool),
        }
    }

    pub async fn list(&self) -> AppResult<Vec<Banner>> {
        Ok(self.banners.list().await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<Banner> {
        self.banners
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Banner"))
    }

    pub async fn create(&self, input: &BannerInput) -> AppResult<Banner> {
        let placement = validate_banner(input)?;
        Ok(self.banners.create(input, placement.as_str()).await?)
    }

    pub async fn update(&self, id: i64, input: &BannerInput) -> AppResult<Banner> {
        let placement = validate_banner(input)?;
        self.banners
            .update(id, input, placement.as_str())
            .await?
            .ok_or_else(|| AppError::not_found("Banner"))
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if !self.banners.delete(id).await? {
            return Err(AppError::not_found("Banner"));
        }
        Ok(())
    }

    pub async fn reorder(&self, ids: &[i64]) -> AppResult<()> {
        check_order(ids)?;
        Ok(self.banners.reorder(ids).await?)
    }

    /// Banners a client should see right now.
    pub async fn active(&self, placement: Option<&str>) -> AppResult<Vec<Banner>> {
        let placement = placement.map(str::parse::<BannerPlacement>).transpose()?;
        let now = Utc::now();
        Ok(self
            .banners
            .active(placement.as_ref().map(BannerPlacement::as_str))
            .await?
            .into_iter()
            .filter(|b| b.is_visible_at(now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input() -> BannerInput {
        BannerInput {
            title: "Black Friday".into(),
            image_url: "https://cdn.example/bf.png".into(),
            link_url: Some("https://t.me/shop".into()),
            placement: Some("dashboard".into()),
            sort_order: None,
            is_active: None,
            starts_at: None,
            ends_at: None,
        }
    }

    #[test]
    fn parses_placement_with_home_default() {
        assert_eq!(validate_banner(&input()).unwrap(), BannerPlacement::Dashboard);
        let mut b = input();
        b.placement = None;
        assert_eq!(validate_banner(&b).unwrap(), BannerPlacement::Home);
        b.placement = Some("footer".into());
        assert!(validate_banner(&b).is_err());
    }

    #[test]
    fn window_must_be_ordered() {
        let now = Utc::now();
        let mut b = input();
        b.starts_at = Some(now);
        b.ends_at = Some(now - Duration::hours(1));
        assert!(validate_banner(&b).is_err());
        b.ends_at = Some(now + Duration::days(3));
        assert!(validate_banner(&b).is_ok());
    }

    #[test]
    fn urls_are_checked() {
        let mut b = input();
        b.link_url = Some("not a url".into());
        assert!(validate_banner(&b).is_err());
        b.link_url = Some(String::new());
        assert!(validate_banner(&b).is_ok());
    }

    #[test]
    fn reorder_needs_unique_ids() {
        assert!(check_order(&[]).is_err());
        assert!(check_order(&[3, 1, 3]).is_err());
        assert!(check_order(&[3, 1, 2]).is_ok());
    }
}
