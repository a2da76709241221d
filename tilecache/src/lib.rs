//! Tilecache - a size-bounded on-disk LRU cache for map tiles
//!
//! Tiles are addressed by `(x, y, zoom)` and stored as one file each under
//! a cache root, with a SQLite index tracking size and last access so the
//! least recently used tiles can be evicted once a storage budget is
//! exceeded. Several processes may share one cache root.
//!
//! ```no_run
//! use tilecache::cache::{CacheConfig, DiskTileCache, TileCache, TileKey};
//!
//! let cache = DiskTileCache::open(CacheConfig::new("/tmp/tiles", 64 * 1024 * 1024))?;
//! let key = TileKey::new(4, 7, 5);
//!
//! if cache.get(&key).is_none() {
//!     cache.put(&key, b"tile bytes");
//! }
//! # Ok::<(), tilecache::cache::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod logging;
pub mod time;

/// Version of the tilecache library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
