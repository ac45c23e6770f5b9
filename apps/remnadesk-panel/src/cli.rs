use anyhow::{Result, bail};
use remnadesk_db::models::admin::AdminRole;
use remnadesk_db::models::backup::{BackupKind, BackupStatus};

use crate::state::AppState;

pub async fn create_admin(state: &AppState, username: &str, password: &str, role: &str) -> Result<()> {
    let role: AdminRole = role.parse()?;
    let created = state.access.upsert_from_cli(username, password, role).await?;
    if created {
        println!("New {} '{}' created successfully.", role, username);
    } else {
        println!("Admin '{}' already exists; password has been reset.", username);
    }
    state
        .logging
        .system("cli_admin", format!("Admin '{}' provisioned from the command line", username))
        .await;
    Ok(())
}

pub async fn reset_password(state: &AppState, username: &str, password: &str) -> Result<()> {
    state.access.reset_password_by_username(username, password).await?;
    println!("Password for user '{}' has been successfully reset.", username);
    state
        .logging
        .system("cli_reset_password", format!("Password of '{}' reset from the command line", username))
        .await;
    Ok(())
}

pub async fn sync(state: &AppState) -> Result<()> {
    let report = state.remnawave.sync_all().await?;
    println!(
        "Fetched {}, matched {}, created {}, updated {}, unmatched {}, skipped {}, errors {}",
        report.fetched,
        report.matched,
        report.created,
        report.updated,
        report.unmatched,
        report.skipped,
        report.errors
    );
    Ok(())
}

pub async fn backup(state: &AppState) -> Result<()> {
    let backup = state.backups.create(BackupKind::Manual, None).await?;
    if backup.status == BackupStatus::Failed.as_str() {
        bail!(
            "Backup failed: {}",
            backup.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("Backup written: {} ({} bytes)", backup.filename, backup.size_bytes);
    Ok(())
}
