//! Size-bounded on-disk tile cache.
//!
//! Tiles are stored as files in a `zoom/y/x` tree, tracked by a SQLite
//! index with a running size total, and evicted least-recently-accessed
//! first whenever a write pushes the total over budget.

mod disk;
mod eviction;
mod index;
mod key;
mod path;
mod stats;
mod storage;
mod r#trait;
mod types;

pub use disk::DiskTileCache;
pub use eviction::{EvictionOutcome, LruEviction};
pub use index::{CacheIndex, IndexError, IndexTxn};
pub use key::{TileKey, TileKeyParseError};
pub use r#trait::{NoOpCache, TileCache};
pub use stats::{CacheStatistics, CacheStats};
pub use storage::{size_on_disk, LockedFile, StorageError, TileStorage};
pub use types::{CacheConfig, CacheEntry, CacheError, DEFAULT_MAX_STORAGE};

pub use path::{address_path, index_path, tile_address, tile_path, INDEX_FILE_NAME};
