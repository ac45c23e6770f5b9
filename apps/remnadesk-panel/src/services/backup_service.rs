use std::path::PathBuf;

use chrono::Utc;
use remnadesk_db::models::backup::{Backup, BackupKind, BackupStatus};
use remnadesk_db::models::page::{Page, Pagination};
use remnadesk_db::repositories::backup_repo::BackupRepository;
use sqlx::PgPool;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::PanelConfig;
use crate::error::{AppError, AppResult};

const FILE_PREFIX: &str = "remnadesk_";
const FILE_SUFFIX: &str = ".dump";
const MAX_ERROR_LEN: usize = 2000;

/// Accepts only names this service generates, so a stored name can never
/// point outside the backup directory.
pub fn validate_filename(name: &str) -> AppResult<()> {
    let ok = name.starts_with(FILE_PREFIX)
        && name.ends_with(FILE_SUFFIX)
        && name.len() > FILE_PREFIX.len() + FILE_SUFFIX.len()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid backup filename '{}'", name)))
    }
}

pub fn backup_filename(now: chrono::DateTime<Utc>) -> String {
    format!("{}{}{}", FILE_PREFIX, now.format("%Y%m%d_%H%M%S_%3f"), FILE_SUFFIX)
}

fn truncate(msg: &str) -> String {
    let msg = msg.trim();
    match msg.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => format!("{}...", &msg[..idx]),
        None => msg.to_string(),
    }
}

pub struct BackupService {
    backups: BackupRepository,
    dir: PathBuf,
    pg_dump: String,
    database_url: String,
}

impl BackupService {
    pub fn new(pool: PgPool, config: &PanelConfig) -> Self {
        Self {
            backups: BackupRepository::new(pool),
            dir: config.backup_dir.clone(),
            pg_dump: config.pg_dump_path.clone(),
            database_url: config.database_url.clone(),
        }
    }

    /// Runs pg_dump and records the outcome. A failed dump is recorded too and
    /// returned with status `failed`.
    pub async fn create(&self, kind: BackupKind, admin_id: Option<i64>) -> AppResult<Backup> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cannot create {}: {}", self.dir.display(), e)))?;

        let filename = backup_filename(Utc::now());
        let path = self.dir.join(&filename);
        info!("Starting {} backup to {}", kind, path.display());

        let output = Command::new(&self.pg_dump)
            .arg("--format=custom")
            .arg("--no-owner")
            .arg("--file")
            .arg(&path)
            .arg("--dbname")
            .arg(&self.database_url)
            .output()
            .await;

        let failure = match output {
            Ok(out) if out.status.success() => None,
            Ok(out) => Some(truncate(&String::from_utf8_lossy(&out.stderr))),
            Err(e) => Some(format!("Failed to run {}: {}", self.pg_dump, e)),
        };

        let backup = match failure {
            None => {
                let size = tokio::fs::metadata(&path).await.map(|m| m.len() as i64).unwrap_or(0);
                let b = self
                    .backups
                    .insert(&filename, size, kind.as_str(), BackupStatus::Completed.as_str(), None, admin_id)
                    .await?;
                info!("Backup {} completed ({} bytes)", b.filename, b.size_bytes);
                b
            }
            Some(err) => {
                error!("Backup {} failed: {}", filename, err);
                let _ = tokio::fs::remove_file(&path).await;
                self.backups
                    .insert(&filename, 0, kind.as_str(), BackupStatus::Failed.as_str(), Some(&err), admin_id)
                    .await?
            }
        };
        Ok(backup)
    }

    pub async fn list(&self, page: &Pagination) -> AppResult<Page<Backup>> {
        let (rows, total) = self.backups.list(page).await?;
        Ok(Page::new(rows, total, page))
    }

    pub async fn get(&self, id: i64) -> AppResult<Backup> {
        self.backups
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Backup"))
    }

    pub async fn download(&self, id: i64) -> AppResult<(String, Vec<u8>)> {
        let backup = self.get(id).await?;
        if backup.status != BackupStatus::Completed.as_str() {
            return Err(AppError::Conflict("Only completed backups can be downloaded".into()));
        }
        validate_filename(&backup.filename)?;
        let bytes = tokio::fs::read(self.dir.join(&backup.filename))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AppError::not_found("Backup file"),
                _ => AppError::Internal(anyhow::anyhow!("Failed to read backup {}: {}", backup.filename, e)),
            })?;
        Ok((backup.filename, bytes))
    }

    pub async fn delete(&self, id: i64) -> AppResult<Backup> {
        let backup = self.get(id).await?;
        validate_filename(&backup.filename)?;
        match tokio::fs::remove_file(self.dir.join(&backup.filename)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove backup file {}: {}", backup.filename, e),
        }
        self.backups.delete(id).await?;
        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_names_pass_validation() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 3, 2, 1).unwrap();
        let name = backup_filename(now);
        assert_eq!(name, "remnadesk_20260504_030201_000.dump");
        assert!(validate_filename(&name).is_ok());
    }

    #[test]
    fn rejects_path_tricks() {
        for bad in [
            "../etc/passwd",
            "remnadesk_../../x.dump",
            "remnadesk_a/b.dump",
            "other_1.dump",
            "remnadesk_.dump",
            "remnadesk_1.sql",
        ] {
            assert!(validate_filename(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn truncates_long_errors() {
        let long = "e".repeat(MAX_ERROR_LEN + 10);
        assert_eq!(truncate(&long).chars().count(), MAX_ERROR_LEN + 3);
        assert_eq!(truncate("  short \n"), "short");
    }
}
