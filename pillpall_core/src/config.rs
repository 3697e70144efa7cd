//! Configuration file support for PillPall.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/pillpall/config.toml`.

use crate::anomaly::AnomalyPolicy;
use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub anomaly: AnomalyPolicy,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Reconciliation parameters
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ReconcileConfig {
    /// Minutes after a slot's scheduled time before it can be reported missed
    #[serde(default)]
    pub grace_minutes: i64,
}

/// Longest accepted grace window: one year
pub const MAX_GRACE_MINUTES: i64 = 366 * 24 * 60;

impl ReconcileConfig {
    /// Grace window, clamped to `0..=MAX_GRACE_MINUTES`
    pub fn grace(&self) -> Duration {
        Duration::minutes(self.grace_minutes.clamp(0, MAX_GRACE_MINUTES))
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir_or_cwd().join(".local/share"));
    base.join("pillpall")
}

fn home_dir_or_cwd() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Check value ranges that serde alone cannot express
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_GRACE_MINUTES).contains(&self.reconcile.grace_minutes) {
            return Err(Error::Config(format!(
                "reconcile.grace_minutes must be within [0, {}] (got {})",
                MAX_GRACE_MINUTES, self.reconcile.grace_minutes
            )));
        }
        self.anomaly.validate()
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir_or_cwd().join(".config"));
        base.join("pillpall").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
