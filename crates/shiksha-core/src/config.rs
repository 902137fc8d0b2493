//! Application configuration management.
//!
//! Holds the server address, where local data lives, sync and request
//! timing, and who last logged in. Stored at
//! `~/.config/shiksha-leap/config.json`; `SHIKSHA_API_URL` and
//! `SHIKSHA_DATA_DIR` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "shiksha-leap";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Database file name in the data directory
const DB_FILE: &str = "shiksha.db";

/// Cache bucket directory in the data directory
const CACHE_DIR: &str = "cache";

/// Used when the platform data directory cannot be determined.
pub const FALLBACK_DATA_DIR: &str = "./shiksha-data";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/";
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "SHIKSHA_API_URL";
pub const ENV_DATA_DIR: &str = "SHIKSHA_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub data_dir: Option<PathBuf>,
    pub sync_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub student_id: Option<String>,
    pub last_contact: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            student_id: None,
            last_contact: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(dir) = var(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// The server root. API calls go under `/api/`.
    pub fn api_base(&self) -> Result<Url> {
        let mut raw = self.api_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("Invalid API base URL: {}", self.api_base_url))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// The data directory, or `FALLBACK_DATA_DIR` when none can be found.
    pub fn data_dir_or_fallback(&self) -> PathBuf {
        self.data_dir().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to local data directory");
            PathBuf::from(FALLBACK_DATA_DIR)
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir_or_fallback().join(DB_FILE)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir_or_fallback().join(CACHE_DIR)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Student id used when saving records; falls back to the contact.
    pub fn student_id(&self) -> Option<&str> {
        self.student_id.as_deref().or(self.last_contact.as_deref())
    }
}
