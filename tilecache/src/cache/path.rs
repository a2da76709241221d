//! Cache path construction.
//!
//! Tiles live in a `zoom/y/x` tree under the cache root, next to the
//! `index.db` file:
//!
//! ```text
//! <root>/index.db
//! <root>/<zoom>/<y>/<x>
//! ```

use std::path::{Path, PathBuf};

use crate::cache::key::TileKey;

/// File name of the SQLite index inside the cache root.
pub const INDEX_FILE_NAME: &str = "index.db";

/// Content address of a tile: its path relative to the cache root.
///
/// # Example
///
/// ```
/// use tilecache::cache::{tile_address, TileKey};
///
/// assert_eq!(tile_address(&TileKey::new(5279, 12754, 15)), "15/12754/5279");
/// ```
pub fn tile_address(key: &TileKey) -> String {
    format!("{}/{}/{}", key.zoom, key.y, key.x)
}

/// Full path of the file holding a tile.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use tilecache::cache::{tile_path, TileKey};
///
/// let path = tile_path(&PathBuf::from("/cache"), &TileKey::new(5279, 12754, 15));
/// assert_eq!(path, PathBuf::from("/cache/15/12754/5279"));
/// ```
pub fn tile_path(root: &Path, key: &TileKey) -> PathBuf {
    root.join(key.zoom.to_string())
        .join(key.y.to_string())
        .join(key.x.to_string())
}

/// Resolve a content address (as stored in the index) to a path.
pub fn address_path(root: &Path, address: &str) -> PathBuf {
    address
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Path of the index database.
pub fn index_path(root: &Path) -> PathBuf {
    root.join(INDEX_FILE_NAME)
}
