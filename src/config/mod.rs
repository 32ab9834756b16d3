//! Configuration module for Fixhub

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Reconciliation sweeper configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to SQLite database
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn get_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            PathBuf::from(path)
        } else {
            get_data_dir().join("data.db")
        }
    }
}

/// Reconciliation sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweep passes
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Maximum appointments examined per pass
    #[serde(default = "default_batch_size")]
    pub batch_size: i32,
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_batch_size() -> i32 {
    500
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

/// Get the data directory for Fixhub
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("fixhub"))
        .or_else(|| dirs::home_dir().map(|h| h.join(".fixhub")))
        .unwrap_or_else(|| PathBuf::from(".fixhub"))
}

/// Get the config directory for Fixhub
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("fixhub"))
        .unwrap_or_else(get_data_dir)
}

/// Load configuration from file or defaults
pub fn load_config() -> Config {
    let config_path = get_config_dir().join("config.toml");

    if config_path.exists() {
        if let Ok(contents) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str(&contents) {
                return config;
            }
        }
    }

    Config::default()
}

/// Save configuration to file
pub fn save_config(config: &Config) -> std::io::Result<()> {
    let config_dir = get_config_dir();
    std::fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.toml");
    let contents = toml::to_string_pretty(config).unwrap_or_default();
    std::fs::write(config_path, contents)?;

    Ok(())
}
