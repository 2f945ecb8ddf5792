use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::models::SyncReport;

/// What one scheduled tick did.
#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    NotConfigured,
    Busy,
    Synced(SyncReport),
    Failed,
}

pub struct SchedulerHandle {
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Runs a full sync every configured interval. The interval is re-read before each sleep so
/// a settings change takes effect from the next tick.
pub fn start(app: Arc<App>) -> SchedulerHandle {
    let task = tokio::spawn(async move {
        loop {
            let interval = app.config().read().sync_interval();
            debug!(seconds = interval.as_secs(), "next scheduled sync");
            tokio::time::sleep(interval).await;
            tick(&app).await;
        }
    });
    SchedulerHandle { task }
}

pub async fn tick(app: &App) -> TickOutcome {
    if !app.config().read().has_credentials() {
        debug!("scheduled sync skipped: API credentials not configured");
        return TickOutcome::NotConfigured;
    }

    match app.try_run_sync().await {
        None => {
            info!("scheduled sync skipped: previous sync still running");
            TickOutcome::Busy
        }
        Some(Ok(report)) => TickOutcome::Synced(report),
        Some(Err(err)) => {
            warn!("scheduled sync failed: {err}");
            TickOutcome::Failed
        }
    }
}
