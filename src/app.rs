use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::api_client::{ApiClient, ApiError};
use crate::config::ConfigStore;
use crate::db::Store;
use crate::enhancer::ModalEnhancer;
use crate::models::SyncReport;
use crate::sync::{EventSync, SyncError, SyncOptions};

/// Everything a request, a scheduled tick or a CLI command needs. The API client and the
/// enhancer are rebuilt from the current config on every use so settings changes apply
/// without a restart.
pub struct App {
    config: ConfigStore,
    store: Arc<Mutex<Store>>,
    sync_lock: AsyncMutex<()>,
}

impl App {
    pub fn new(config: ConfigStore, store: Store) -> Self {
        Self {
            config,
            store: Arc::new(Mutex::new(store)),
            sync_lock: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn store(&self) -> Result<MutexGuard<'_, Store>, SyncError> {
        self.store.lock().map_err(|_| SyncError::StoreUnavailable)
    }

    pub fn api_client(&self) -> ApiClient {
        ApiClient::from_config(&self.config.read())
    }

    pub fn event_sync(&self) -> EventSync<ApiClient> {
        let config = self.config.read();
        EventSync::new(ApiClient::from_config(&config), SyncOptions::from_config(&config))
    }

    pub fn enhancer(&self) -> ModalEnhancer {
        ModalEnhancer::from_config(&self.config.read())
    }

    /// Full sync; waits for any sync already in flight.
    pub async fn run_sync(&self) -> Result<SyncReport, SyncError> {
        let _running = self.sync_lock.lock().await;
        self.event_sync().sync_all(&self.store).await
    }

    /// Full sync unless one is already running, in which case `None`.
    pub async fn try_run_sync(&self) -> Option<Result<SyncReport, SyncError>> {
        let Ok(_running) = self.sync_lock.try_lock() else {
            return None;
        };
        Some(self.event_sync().sync_all(&self.store).await)
    }

    pub async fn sync_event(&self, platform_id: &str) -> Result<i64, SyncError> {
        let _running = self.sync_lock.lock().await;
        let id = self.event_sync().sync_event(&self.store, platform_id).await?;
        info!(id, platform_id, "synced single event");
        Ok(id)
    }

    pub async fn test_connection(&self) -> Result<(), ApiError> {
        self.api_client().test_connection().await
    }

    pub fn enhanced_content(&self, event_id: i64) -> Result<Option<String>, SyncError> {
        let enhancer = self.enhancer();
        let store = self.store()?;
        Ok(enhancer.get_enhanced_content(&store, event_id)?)
    }
}
