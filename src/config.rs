//! Persistent application configuration
//!
//! Bundles the sonar tuning, the remote service addresses and the control
//! loop settings in a JSON file at `<data_dir>/echorange/config.json`.

use echorange_core::remote::RemoteConfig;
use echorange_core::SonarConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_history_capacity() -> usize {
    10
}

fn default_max_consecutive_failures() -> u32 {
    3
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sonar: SonarConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Recordings kept in memory
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Failed measurements in a row before the loop gives up
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sonar: SonarConfig::default(),
            remote: RemoteConfig::default(),
            history_capacity: default_history_capacity(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl AppConfig {
    /// Config file path: `<data_dir>/echorange/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("echorange")
            .join("config.json")
    }

    /// Load from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load from `path`, falling back to defaults on any error or invalid value
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => match config.sonar.validate() {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "Loaded config from disk");
                        config
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}
