use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};

use crate::state::AppState;

const MIN_SWEEP_SECS: u64 = 10;
const MIN_SYNC_SECS: u64 = 60;

/// Background loop: expires lapsed subscriptions and, when enabled, pulls
/// Remnawave accounts on a fixed interval.
pub struct MonitoringService {
    state: AppState,
}

impl MonitoringService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn start(&self) {
        let sweep_secs = self.state.config.expiry_sweep_secs.max(MIN_SWEEP_SECS);
        let sync_secs = self.state.config.remnawave.sync_interval_secs;
        let sync_enabled = sync_secs > 0 && self.state.remnawave.is_configured();
        info!(
            "Starting background monitoring (expiry sweep every {}s, Remnawave sync {})",
            sweep_secs,
            if sync_enabled { format!("every {}s", sync_secs.max(MIN_SYNC_SECS)) } else { "off".to_string() }
        );

        let mut sweep = interval(Duration::from_secs(sweep_secs));
        let mut sync = interval(Duration::from_secs(sync_secs.max(MIN_SYNC_SECS)));
        sync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    if let Err(e) = self.state.subscriptions.sweep_expired().await {
                        error!("Monitoring error (expirations): {}", e);
                    }
                }
                _ = sync.tick(), if sync_enabled => {
                    match self.state.remnawave.sync_all().await {
                        Ok(report) if report.errors > 0 => {
                            error!("Remnawave sync finished with {} errors", report.errors);
                        }
                        Ok(_) => {}
                        Err(e) => error!("Monitoring error (Remnawave sync): {}", e),
                    }
                }
            }
        }
    }
}
