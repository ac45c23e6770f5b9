use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod cli;
mod config;
mod error;
mod handlers;
mod remnawave;
mod services;
mod settings;
mod state;

use crate::config::PanelConfig;
use crate::services::monitoring::MonitoringService;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "remnadesk")]
#[command(about = "RemnaDesk VPN reseller admin panel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and background jobs (default)
    Serve,
    /// Administrator accounts
    Admin {
        #[command(subcommand)]
        subcommand: AdminCommands,
    },
    /// Pull all Remnawave panel users once and exit
    Sync,
    /// Write a pg_dump backup once and exit
    Backup,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create an administrator, or reset its password if it exists
    Create {
        username: String,
        password: String,
        /// superadmin, admin or support
        #[arg(long, default_value = "admin")]
        role: String,
    },
    /// Reset an administrator's password
    ResetPassword {
        username: String,
        new_pass: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        println!("Warning: failed to load .env file: {}", e);
    }

    let cli = Cli::parse();
    let cfg = PanelConfig::load()?;

    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("Failed to create log dir {}", cfg.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::never(&cfg.log_dir, "panel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remnadesk_panel=debug,remnadesk_db=info,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    info!("RemnaDesk panel v{}", env!("CARGO_PKG_VERSION"));

    let pool = remnadesk_db::init_db(&cfg.database_url, cfg.max_connections).await?;
    info!("Database initialized");

    let state = AppState::build(pool, cfg)?;
    if let Err(e) = state.settings.reload_cache().await {
        warn!("Failed to load settings, using defaults: {:#}", e);
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(state).await?,
        Commands::Admin { subcommand } => match subcommand {
            AdminCommands::Create { username, password, role } => {
                cli::create_admin(&state, &username, &password, &role).await?;
            }
            AdminCommands::ResetPassword { username, new_pass } => {
                cli::reset_password(&state, &username, &new_pass).await?;
            }
        },
        Commands::Sync => cli::sync(&state).await?,
        Commands::Backup => cli::backup(&state).await?,
    }

    Ok(())
}

async fn run_server(state: AppState) -> Result<()> {
    let monitoring = MonitoringService::new(state.clone());
    tokio::spawn(async move {
        monitoring.start().await;
    });

    let addr = state.config.listen_addr;
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
