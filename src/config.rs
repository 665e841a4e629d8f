//! Configuration loading and management.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

/// Settings for the task API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to bind; 0 picks a free one.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required from clients. No auth when absent.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            auth_token: None,
        }
    }
}

/// Settings for the sync client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote task API.
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// Bearer token sent to the remote. No header when absent.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Period of the sync timer in seconds.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Path to the change queue database.
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: default_remote_url(),
            auth_token: None,
            interval_seconds: default_interval_seconds(),
            queue_path: default_queue_path(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_remote_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_queue_path() -> PathBuf {
    PathBuf::from(".quadrant/queue.db")
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from default locations or fall back to defaults, then apply
    /// environment overrides.
    pub fn load_or_default() -> Self {
        let mut config = Self::load(".quadrant/config.yaml")
            .or_else(|_| match dirs::config_dir() {
                Some(dir) => Self::load(dir.join("quadrant/config.yaml")),
                None => Ok(Self::default()),
            })
            .unwrap_or_default();

        if let Ok(port) = std::env::var("QUADRANT_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }
        if let Ok(token) = std::env::var("QUADRANT_AUTH_TOKEN") {
            config.server.auth_token = Some(token.clone());
            config.sync.auth_token = Some(token);
        }
        if let Ok(url) = std::env::var("QUADRANT_REMOTE_URL") {
            config.sync.remote_url = url;
        }
        if let Ok(interval) = std::env::var("QUADRANT_SYNC_INTERVAL") {
            if let Ok(interval) = interval.parse() {
                config.sync.interval_seconds = interval;
            }
        }
        if let Ok(path) = std::env::var("QUADRANT_QUEUE_PATH") {
            config.sync.queue_path = PathBuf::from(path);
        }

        config
    }
}
