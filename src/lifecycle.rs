use tracing::{info, warn};

use crate::app::App;
use crate::config::ConfigStore;
use crate::db::Store;
use crate::scheduler::SchedulerHandle;
use crate::sync::SyncError;

/// Opens the configured database and prepares it for syncing.
pub fn activate(config: ConfigStore) -> Result<App, SyncError> {
    let path = config.read().database_path();
    let store = Store::open(&path)?;
    info!(path = %path.display(), "opened content store");
    activate_with_store(config, store)
}

/// Refuses to start without the calendar tables, then makes sure the side table and the
/// settings file exist. Existing settings and data are left alone.
pub fn activate_with_store(config: ConfigStore, store: Store) -> Result<App, SyncError> {
    if !store.calendar_installed()? {
        return Err(SyncError::DependencyMissing);
    }
    store.init_schema()?;

    if let Err(err) = config.ensure_saved() {
        warn!("could not write default settings to {:?}: {err}", config.path());
    }
    Ok(App::new(config, store))
}

/// Stops scheduled syncs. Settings, records and the side table are kept for reactivation.
pub fn deactivate(scheduler: Option<SchedulerHandle>) {
    if let Some(handle) = scheduler {
        handle.stop();
        info!("scheduled sync stopped");
    }
}
