use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub crawler: CrawlerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub crawl_interval_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub max_content_size_bytes: usize,
    pub max_download_attempts: i64,
    pub max_batch_size: i64,
    pub retention_months: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:bookmarks.sqlite".to_owned(),
            crawler: CrawlerConfig::default(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            crawl_interval_seconds: 300,
            fetch_timeout_seconds: 20,
            max_content_size_bytes: 2 * 1024 * 1024,
            max_download_attempts: 3,
            max_batch_size: 20,
            retention_months: 6,
        }
    }
}

impl CrawlerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.crawl_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// Retention cutoff for one tick, as unix seconds. Computed once
    /// per tick and shared by discovery and pruning so both phases
    /// agree on the window.
    pub fn feed_cutoff(&self, now: DateTime<Utc>) -> i64 {
        (now - Months::new(self.retention_months)).timestamp()
    }
}

impl AppConfig {
    /// Platform config file location, creating the directory if needed.
    pub fn config_file_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir =
            dirs::config_dir().ok_or("could not locate the user config directory")?;
        let app_dir = config_dir.join("bookmarks");
        std::fs::create_dir_all(&app_dir)?;
        Ok(app_dir.join("config.json"))
    }

    /// Load from the default location, falling back to defaults when
    /// the file is missing or unreadable.
    pub fn load() -> Self {
        match Self::config_file_path() {
            Ok(path) => Self::load_from(&path),
            Err(err) => {
                warn!(error = %err, "could not resolve config path, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match Self::read_file(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "could not load config, using defaults");
                Self::default()
            }
        }
    }

    fn read_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
