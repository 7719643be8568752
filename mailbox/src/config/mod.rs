use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

use crate::services::logger;
use crate::types::error::{MailboxError, Result};

/// Global configuration instance
static CONFIG: OnceCell<RwLock<MailboxConfig>> = OnceCell::new();

/// Configuration of the coordination layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Fetch-progress streams
    pub status: StatusConfig,

    /// Tracing output
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Broadcast capacity of each paginator manager's progress channel.
    /// Receivers lagging further behind skip events.
    pub channel_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: logger::default_filter(),
        }
    }
}

impl MailboxConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("mailbox").join("config.toml"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config").join("mailbox").join("config.toml"));
    }

    paths
}

/// Initialize configuration from the first default path that exists
pub fn init_config() -> Result<()> {
    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return init_config_from_path(&path);
        }
    }

    info!("No config file found, using defaults");
    set_config(MailboxConfig::default())
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &Path) -> Result<()> {
    info!("Loading configuration from: {:?}", path);
    set_config(MailboxConfig::load(path)?)
}

/// Current configuration, or defaults if none was initialized
pub fn current() -> MailboxConfig {
    CONFIG
        .get()
        .and_then(|lock| lock.read().ok().map(|config| config.clone()))
        .unwrap_or_default()
}

fn set_config(config: MailboxConfig) -> Result<()> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock
                .write()
                .map_err(|e| MailboxError::Config(format!("Failed to lock config: {}", e)))?;
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}
