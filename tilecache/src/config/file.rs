//! Configuration file handling for `<config dir>/tilecache/config.ini`.
//!
//! ```ini
//! [cache]
//! directory = ~/.cache/tilecache
//! max_size = 512MB
//!
//! [logging]
//! level = info
//! file = ~/.cache/tilecache/tilecache.log
//! ```
//!
//! Missing keys keep their defaults; a missing file yields all defaults.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::size::parse_size;
use crate::cache::CacheConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub max_size: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Optional log file in addition to stderr
    pub file: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            cache: CacheSettings {
                directory: cache.root,
                max_size: cache.max_storage,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Cache construction parameters described by this file.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache.directory.clone(), self.cache.max_size)
    }
}

fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("max_size") {
            config.cache.max_size = parse_size(v).map_err(|_| ConfigFileError::InvalidValue {
                section: "cache".to_string(),
                key: "max_size".to_string(),
                value: v.to_string(),
                reason: "expected format like '512MB', '2GB', or '4096'".to_string(),
            })?;
        }
    }

    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("level") {
            let level = v.trim().to_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigFileError::InvalidValue {
                    section: "logging".to_string(),
                    key: "level".to_string(),
                    value: v.to_string(),
                    reason: format!("must be one of: {}", LOG_LEVELS.join(", ")),
                });
            }
            config.logging.level = level;
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = Some(expand_tilde(v));
            }
        }
    }

    Ok(config)
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilecache")
        .join("config.ini")
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
