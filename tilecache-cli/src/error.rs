//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use tilecache::cache::{CacheError, TileKey};
use tilecache::config::ConfigFileError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration file could not be loaded
    Config(ConfigFileError),
    /// Cache could not be opened or queried
    Cache(CacheError),
    /// Requested tile is not cached
    Miss(TileKey),
    /// Failed to read an input file
    FileRead { path: PathBuf, error: std::io::Error },
    /// Failed to write tile bytes (`None` means stdout)
    FileWrite {
        path: Option<PathBuf>,
        error: std::io::Error,
    },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Cache(CacheError::Index(_)) = self {
            eprintln!();
            eprintln!("The cache index could not be opened. If it is damaged, remove");
            eprintln!("the cache directory and let it be rebuilt.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::Miss(key) => write!(f, "Tile {} is not cached", key),
            CliError::FileRead { path, error } => {
                write!(f, "Failed to read file '{}': {}", path.display(), error)
            }
            CliError::FileWrite {
                path: Some(path),
                error,
            } => write!(f, "Failed to write file '{}': {}", path.display(), error),
            CliError::FileWrite { path: None, error } => {
                write!(f, "Failed to write to stdout: {}", error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::FileRead { error, .. } => Some(error),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Miss(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_message_names_tile() {
        let err = CliError::Miss(TileKey::new(1, 2, 3));
        assert_eq!(err.to_string(), "Tile 1.2.3 is not cached");
    }

    #[test]
    fn test_file_write_to_stdout_message() {
        let err = CliError::FileWrite {
            path: None,
            error: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"),
        };
        assert!(err.to_string().starts_with("Failed to write to stdout"));
    }

    #[test]
    fn test_cache_error_converts() {
        let err: CliError = CacheError::InvalidConfig("bad root".to_string()).into();
        assert!(matches!(err, CliError::Cache(_)));
        assert!(err.to_string().contains("bad root"));
    }
}
