//! Cache statistics command.

use tilecache::cache::{DiskTileCache, TileCache};

use crate::error::CliError;

/// Print the cache location and its statistics report.
pub fn run(cache: &DiskTileCache) -> Result<(), CliError> {
    println!("Cache root: {}", cache.root().display());
    println!();
    print!("{}", cache.stats().format());
    Ok(())
}
