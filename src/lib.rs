pub mod api_client;
pub mod app;
pub mod config;
pub mod dates;
pub mod db;
pub mod enhancer;
pub mod lifecycle;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod sync;
pub mod text;
mod utils;

pub use api_client::{ApiClient, ApiError, EventSource};
pub use app::App;
pub use config::{AppConfig, ConfigError, ConfigStore};
pub use db::Store;
pub use enhancer::ModalEnhancer;
pub use models::{SyncReport, UpstreamEvent};
pub use sync::{EventSync, EventWriter, SyncError, SyncOptions};

/// Installs the global `tracing` subscriber. `RUST_LOG` still applies on top of the default.
pub fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(true)
        .init();
}
