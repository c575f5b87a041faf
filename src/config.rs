use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const APP_DIR: &str = "bookshelf-tui";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub cover_dir: PathBuf,
    pub log_path: PathBuf,
    /// Edge length of generated thumbnails and monograms, in pixels.
    pub thumb_size: u32,
    /// Upper bound on fetches running at once across all slots.
    pub max_concurrent_fetches: usize,
    pub search_url: String,
    pub cover_url: String,
    pub connectivity_probe: String,
    pub probe_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            database_path: data_dir.join("library.db"),
            cover_dir: cache_dir.join("covers"),
            log_path: cache_dir.join("bookshelf.log"),
            thumb_size: 256,
            max_concurrent_fetches: 4,
            search_url: "https://openlibrary.org/search.json".to_string(),
            cover_url: "https://covers.openlibrary.org/b/id".to_string(),
            connectivity_probe: "openlibrary.org:443".to_string(),
            probe_timeout_ms: 1500,
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join("config.json"))
        .ok_or(Error::NoDirectory("config"))
}

impl Config {
    /// Loads the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
