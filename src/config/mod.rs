//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub presence: PresenceConfig,
    pub activity: ActivityConfig,
}

/// Presence daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Whether presence broadcasting is enabled at all
    pub enabled: bool,

    /// Client identifier presented to the daemon at login
    pub client_id: String,

    /// Daemon socket override
    pub socket_path: Option<PathBuf>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: "beacon".to_string(),
            socket_path: None,
        }
    }
}

/// Activity payload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Anchor elapsed time to the collaboration session start instead of
    /// the editor session start
    pub session_elapsed_time: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            session_elapsed_time: false,
        }
    }
}

impl Config {
    /// Load config from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Write the config back to its file
    pub fn store(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("beacon")
            .join("config.toml")
    }

    /// Socket path of the presence daemon
    pub fn socket_path(&self) -> PathBuf {
        self.presence.socket_path.clone().unwrap_or_else(|| {
            dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("presenced.sock")
        })
    }
}
