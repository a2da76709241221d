//! Configuration for the tile cache.
//!
//! Settings come from an INI file (see [`ConfigFile`]) and can be overridden
//! on the command line. Sizes are written in human-readable form such as
//! `512MB` and handled by [`parse_size`] and [`format_size`].
//!
//! # Example
//!
//! ```
//! use tilecache::config::{format_size, ConfigFile};
//!
//! let config = ConfigFile::default();
//! assert_eq!(format_size(config.cache.max_size), "512MB");
//! ```

mod file;
mod size;

pub use file::{config_file_path, CacheSettings, ConfigFile, ConfigFileError, LoggingSettings};
pub use size::{format_size, parse_size, SizeParseError};
