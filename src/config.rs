//! Configuration module for hubbub.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::channel::Icon;
use crate::{ChatError, Result};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file, written in addition to the console.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Chatter storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per chatter.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "data/chatters".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Background persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Maximum concurrent storage operations.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Extra attempts after a failed save.
    #[serde(default = "default_save_retries")]
    pub save_retries: u32,
    /// Pause between save attempts in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_save_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    200
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            save_retries: default_save_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// A `[channels.<key>]` entry as written.
///
/// Every field is optional here so that one broken entry does not make
/// the whole document fail to parse; [`ChannelEntry::validate`] decides
/// whether it becomes a channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelEntry {
    /// Channel name.
    pub name: Option<String>,
    /// Prefix with `&` color codes.
    pub prefix: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Marker used to address the channel.
    pub marker: Option<String>,
    /// Icon identifier.
    pub logo: Option<String>,
    /// Condition string.
    pub conditions: Option<String>,
}

/// A validated channel entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Channel name.
    pub name: String,
    /// Prefix with `&` color codes.
    pub prefix: String,
    /// Description, empty when absent.
    pub description: String,
    /// Marker used to address the channel.
    pub marker: String,
    /// Icon, [`Icon::Paper`] when absent or unknown.
    pub icon: Icon,
    /// Condition string, empty when absent.
    pub conditions: String,
}

fn required(value: &Option<String>, field: &str, key: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ChatError::Config(format!(
            "channel section '{key}' has no {field}"
        ))),
    }
}

impl ChannelEntry {
    /// Check required fields and resolve defaults.
    ///
    /// Missing `name`, `prefix` or `marker` is an error. A missing or
    /// unknown `logo` falls back to paper with a warning.
    pub fn validate(&self, key: &str) -> Result<ChannelSettings> {
        let name = required(&self.name, "name", key)?;
        // The prefix keeps its trailing whitespace
        let prefix = match self.prefix.as_deref() {
            Some(p) if !p.trim().is_empty() => p.to_string(),
            _ => {
                return Err(ChatError::Config(format!(
                    "channel section '{key}' has no prefix"
                )))
            }
        };
        let marker = required(&self.marker, "marker", key)?;

        let icon = match self.logo.as_deref().map(str::trim) {
            None | Some("") => {
                warn!(channel = %name, "Channel has no logo, using paper");
                Icon::Paper
            }
            Some(logo) => logo.parse().unwrap_or_else(|_| {
                warn!(channel = %name, logo = %logo, "Unknown channel logo, using paper");
                Icon::Paper
            }),
        };

        Ok(ChannelSettings {
            name,
            prefix,
            description: self.description.clone().unwrap_or_default(),
            marker,
            icon,
            conditions: self.conditions.clone().unwrap_or_default(),
        })
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Install the built-in JSON file chatter provider at startup.
    #[serde(default = "default_chatter_provider")]
    pub default_chatter_provider: bool,
    /// Channel new chatters start in.
    #[serde(default)]
    pub default_channel: Option<String>,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Chatter storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Channel entries by section key.
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelEntry>,
}

fn default_chatter_provider() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_chatter_provider: default_chatter_provider(),
            default_channel: None,
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            persistence: PersistenceConfig::default(),
            channels: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ChatError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ChatError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `HUBBUB_STORAGE_PATH`: Override the chatter storage directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("HUBBUB_STORAGE_PATH") {
            if !path.is_empty() {
                self.storage.path = path;
            }
        }
    }

    /// Validated channel entries in section order.
    ///
    /// Invalid entries are logged and skipped.
    pub fn channel_settings(&self) -> Vec<ChannelSettings> {
        self.channels
            .iter()
            .filter_map(|(key, entry)| match entry.validate(key) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    warn!("Skipping channel: {e}");
                    None
                }
            })
            .collect()
    }
}
