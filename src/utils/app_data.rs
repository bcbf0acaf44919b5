use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::index::types::IndexConfig;

const APP_NAME: &str = "csvdex";
const CONFIG_FILE: &str = "config.json";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Field delimiter of input files
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Buffered documents per flushed segment
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Show a spinner while indexing
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_delimiter() -> char {
    ','
}

fn default_flush_threshold() -> usize {
    50_000
}

fn default_progress() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            flush_threshold: default_flush_threshold(),
            progress: default_progress(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        match get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from an explicit file, or return default if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// The delimiter as the single byte the CSV reader expects
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() && self.delimiter != '"' && self.delimiter != '\n' {
            Ok(self.delimiter as u8)
        } else {
            anyhow::bail!("Unsupported delimiter {:?}: must be a single ASCII character", self.delimiter)
        }
    }

    /// Engine settings derived from this config
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            flush_threshold: self.flush_threshold.max(1),
        }
    }

    fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        if self.flush_threshold == 0 {
            anyhow::bail!("flush_threshold must be greater than zero");
        }
        Ok(())
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_app_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Option<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    base.map(|b| b.join(APP_NAME))
}
