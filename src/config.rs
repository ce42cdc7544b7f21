use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Consumer key identifying this app to the Pocket API. Required for
    /// every remote operation.
    pub consumer_key: Option<String>,

    /// How long to wait before re-checking the snooze set when no local
    /// wake is scheduled sooner. Also caps far-future wakes so changes
    /// made on other devices get noticed.
    #[serde(default = "default_fallback_recheck_hours")]
    pub fallback_recheck_hours: u32,

    /// Delay before the startup due-check, giving cross-device sync time
    /// to settle so we don't wake an item another device just re-snoozed.
    #[serde(default = "default_startup_grace_minutes")]
    pub startup_grace_minutes: u32,

    /// Delay before retrying a wake whose reconciliation failed.
    #[serde(default = "default_retry_minutes")]
    pub retry_minutes: u32,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pocket-snooze");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("snoozed.db").to_string_lossy().to_string()
}

fn default_fallback_recheck_hours() -> u32 {
    6
}

fn default_startup_grace_minutes() -> u32 {
    5
}

fn default_retry_minutes() -> u32 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            consumer_key: None,
            fallback_recheck_hours: default_fallback_recheck_hours(),
            startup_grace_minutes: default_startup_grace_minutes(),
            retry_minutes: default_retry_minutes(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pocket-snooze")
            .join("config.toml")
    }

    pub fn fallback_recheck_secs(&self) -> i64 {
        i64::from(self.fallback_recheck_hours) * 3600
    }

    pub fn startup_grace_secs(&self) -> i64 {
        i64::from(self.startup_grace_minutes) * 60
    }

    pub fn retry_secs(&self) -> i64 {
        i64::from(self.retry_minutes) * 60
    }
}
