use anyhow::{Context, Result};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

pub fn validate_database_url(database_url: &str) -> Result<()> {
    if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
        return Err(anyhow::anyhow!(
            "DATABASE_URL must start with postgres:// or postgresql://"
        ));
    }
    Ok(())
}

pub async fn init_db(database_url: &str, max_connections: u32) -> Result<PgPool> {
    validate_database_url(database_url)?;
    let options: PgConnectOptions = database_url.parse().context("Invalid DATABASE_URL")?;
    init_db_with(options, max_connections).await
}

/// Connects with prepared options (e.g. a custom `search_path`) and migrates.
pub async fn init_db_with(options: PgConnectOptions, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .context("Failed to connect to PostgreSQL")?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_postgres_schemes() {
        assert!(validate_database_url("postgres://u:p@localhost/db").is_ok());
        assert!(validate_database_url("postgresql://localhost/db").is_ok());
    }

    #[test]
    fn rejects_sqlite_urls() {
        assert!(validate_database_url("sqlite://panel.db").is_err());
        assert!(validate_database_url("").is_err());
    }
}
