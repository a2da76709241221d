//! Single tile commands: `get` and `put`.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tilecache::cache::{DiskTileCache, TileCache, TileKey};
use tilecache::config::format_size;

use crate::error::CliError;

/// Write a cached tile to `output`, or to stdout when no path is given.
pub fn get(cache: &DiskTileCache, key: &TileKey, output: Option<&Path>) -> Result<(), CliError> {
    let data = cache.get(key).ok_or(CliError::Miss(*key))?;

    match output {
        Some(path) => fs::write(path, &data).map_err(|error| CliError::FileWrite {
            path: Some(path.to_path_buf()),
            error,
        }),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&data)
                .and_then(|()| stdout.flush())
                .map_err(|error| CliError::FileWrite { path: None, error })
        }
    }
}

/// Store the contents of `file` as the tile for `key`.
pub fn put(cache: &DiskTileCache, key: &TileKey, file: &Path) -> Result<(), CliError> {
    let data = fs::read(file).map_err(|error| CliError::FileRead {
        path: file.to_path_buf(),
        error,
    })?;

    cache.put(key, &data);

    match cache.entry(key)? {
        Some(entry) => println!("Stored {} ({} on disk)", key, format_size(entry.size_bytes)),
        None => println!("Tile {} was not retained (write skipped or evicted)", key),
    }
    println!(
        "Cache size: {} of {}",
        format_size(cache.total_size()?),
        format_size(cache.max_storage())
    );
    Ok(())
}
