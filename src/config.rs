use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

pub const MIN_SYNC_INTERVAL_SECS: u64 = 300;
pub const MAX_SYNC_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 3_600;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 500;
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4096";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config mutex poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_endpoint: String,
    pub api_token: String,
    pub sync_interval: u64,
    pub modal_enhancement: bool,
    pub debug_mode: bool,
    pub page_size: u32,
    pub timezone: Option<String>,
    pub database_path: Option<PathBuf>,
    pub listen_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            api_token: String::new(),
            sync_interval: DEFAULT_SYNC_INTERVAL_SECS,
            modal_enhancement: true,
            debug_mode: false,
            page_size: DEFAULT_PAGE_SIZE,
            timezone: None,
            database_path: None,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// Trims credentials and pulls numeric settings back into their allowed ranges.
    pub fn sanitize(&mut self) {
        self.api_endpoint = self.api_endpoint.trim().to_string();
        self.api_token = self.api_token.trim().to_string();
        self.sync_interval = clamp_interval(self.sync_interval);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.timezone = self
            .timezone
            .take()
            .map(|tz| tz.trim().to_string())
            .filter(|tz| !tz.is_empty());
        if self.listen_addr.trim().is_empty() {
            self.listen_addr = DEFAULT_LISTEN_ADDR.to_string();
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(clamp_interval(self.sync_interval))
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_endpoint.trim().is_empty() && !self.api_token.trim().is_empty()
    }

    pub fn site_timezone(&self) -> Option<Tz> {
        let name = self.timezone.as_deref()?;
        match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(err) => {
                tracing::warn!("ignoring unknown timezone {name:?}: {err}");
                None
            }
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }

    /// Applies `LIVE_CONNECT_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("LIVE_CONNECT_API_ENDPOINT") {
            self.api_endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("LIVE_CONNECT_API_TOKEN") {
            self.api_token = token;
        }
        if let Some(interval) = std::env::var("LIVE_CONNECT_SYNC_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.sync_interval = interval;
        }
        if let Some(enabled) = env_flag("LIVE_CONNECT_MODAL_ENHANCEMENT") {
            self.modal_enhancement = enabled;
        }
        if let Some(enabled) = env_flag("LIVE_CONNECT_DEBUG") {
            self.debug_mode = enabled;
        }
        if let Ok(path) = std::env::var("LIVE_CONNECT_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        self.sanitize();
    }
}

pub fn clamp_interval(seconds: u64) -> u64 {
    seconds.clamp(MIN_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS)
}

fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let mut data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("failed to read config {:?}: {err}", path);
                AppConfig::default()
            }
        };
        data.apply_env();
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn in_memory(mut config: AppConfig) -> Self {
        config.sanitize();
        Self {
            path: PathBuf::new(),
            data: Mutex::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.data.lock().map_err(|_| ConfigError::Poisoned)?;
        transform(&mut guard);
        guard.sanitize();
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    /// Writes the file with defaults filled in when it does not exist yet.
    pub fn ensure_saved(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() || self.path.exists() {
            return Ok(());
        }
        let current = self.read();
        self.persist(&current)
    }

    fn persist(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        write_config(&self.path, config)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    let mut config: AppConfig = serde_json::from_str(&contents)?;
    config.sanitize();
    Ok(config)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_clamped_to_allowed_range() {
        assert_eq!(clamp_interval(10), MIN_SYNC_INTERVAL_SECS);
        assert_eq!(clamp_interval(1_000_000), MAX_SYNC_INTERVAL_SECS);
        assert_eq!(clamp_interval(900), 900);

        let config = AppConfig {
            sync_interval: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
    }

    #[test]
    fn defaults_match_fresh_install() {
        let config = AppConfig::default();
        assert_eq!(config.sync_interval, 3_600);
        assert!(config.modal_enhancement);
        assert!(!config.debug_mode);
        assert!(!config.has_credentials());
    }

    #[test]
    fn sanitize_trims_credentials() {
        let mut config = AppConfig {
            api_endpoint: "  https://api.example.com/v1 ".into(),
            api_token: " secret\n".into(),
            page_size: 0,
            timezone: Some("   ".into()),
            ..AppConfig::default()
        };
        config.sanitize();
        assert_eq!(config.api_endpoint, "https://api.example.com/v1");
        assert_eq!(config.api_token, "secret");
        assert_eq!(config.page_size, 1);
        assert_eq!(config.timezone, None);
        assert!(config.has_credentials());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let store = ConfigStore::load_from(path.clone());
        let updated = store
            .update(|config| {
                config.api_endpoint = "https://api.example.com".into();
                config.api_token = "token".into();
                config.sync_interval = 60;
                config.debug_mode = true;
            })
            .unwrap();
        assert_eq!(updated.sync_interval, 300);

        let raw = fs::read_to_string(&path).unwrap();
        let on_disk: AppConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk.api_endpoint, "https://api.example.com");
        assert!(on_disk.debug_mode);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api_token":"abc"}"#).unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.api_token, "abc");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.modal_enhancement);
    }

    #[test]
    fn unknown_timezone_is_ignored() {
        let config = AppConfig {
            timezone: Some("Mars/Olympus".into()),
            ..AppConfig::default()
        };
        assert!(config.site_timezone().is_none());

        let config = AppConfig {
            timezone: Some("America/Boise".into()),
            ..AppConfig::default()
        };
        assert_eq!(config.site_timezone(), Some(chrono_tz::America::Boise));
    }
}
