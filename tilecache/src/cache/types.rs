//! Core types for the cache system.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::index::IndexError;

/// Default storage budget (512 MB).
pub const DEFAULT_MAX_STORAGE: u64 = 512 * 1024 * 1024;

/// One indexed tile, as persisted in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Location of the bytes relative to the cache root (`zoom/y/x`)
    pub address: String,
    /// Tile key in `x.y.zoom` form
    pub key: String,
    /// On-disk allocation size in bytes
    pub size_bytes: u64,
    /// Last access, Unix seconds
    pub last_access: i64,
}

/// Errors that can prevent a cache from being constructed.
///
/// Once open, `get` and `put` never return errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error while preparing the cache root
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The index could not be opened or is corrupt
    #[error("Cache index error: {0}")]
    Index(#[from] IndexError),

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Cache construction parameters.
///
/// Both values are fixed for the lifetime of a cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cache root directory (index plus tile tree)
    pub root: PathBuf,
    /// Maximum on-disk allocation of all tiles, in bytes
    pub max_storage: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilecache");

        Self {
            root,
            max_storage: DEFAULT_MAX_STORAGE,
        }
    }
}

impl CacheConfig {
    /// Create a configuration for the given root and budget.
    pub fn new(root: impl Into<PathBuf>, max_storage: u64) -> Self {
        Self {
            root: root.into(),
            max_storage,
        }
    }

    /// Set the cache root directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the storage budget in bytes.
    pub fn with_max_storage(mut self, max_storage: u64) -> Self {
        self.max_storage = max_storage;
        self
    }

    /// Check that the configuration can back a cache.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.root.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfig(
                "cache root must not be empty".to_string(),
            ));
        }
        if self.root.exists() && !self.root.is_dir() {
            return Err(CacheError::InvalidConfig(format!(
                "cache root '{}' is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}
