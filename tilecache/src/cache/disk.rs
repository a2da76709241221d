//! Disk tile cache: storage, index and eviction tied together.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::eviction::{EvictionOutcome, LruEviction};
use crate::cache::index::{CacheIndex, IndexError};
use crate::cache::key::TileKey;
use crate::cache::path::{index_path, tile_address};
use crate::cache::stats::{CacheStatistics, CacheStats};
use crate::cache::storage::{LockedFile, StorageError, TileStorage};
use crate::cache::r#trait::TileCache;
use crate::cache::types::{CacheConfig, CacheEntry, CacheError};
use crate::time::{Clock, SystemClock};

/// Size-bounded on-disk tile cache.
///
/// Tiles are stored one file per tile under `root/zoom/y/x`, indexed in
/// `root/index.db`. Every `put` runs eviction before returning, so the
/// total allocation stays within `max_storage` unless deleting an old tile
/// fails (see [`LruEviction`]).
///
/// Several instances, in one process or many, may share a root.
pub struct DiskTileCache {
    storage: TileStorage,
    index: CacheIndex,
    eviction: LruEviction,
    clock: Arc<dyn Clock>,
    stats: Mutex<CacheStats>,
}

impl DiskTileCache {
    /// Open a cache using the system clock.
    ///
    /// # Errors
    ///
    /// Fails if the root cannot be created or the index cannot be opened
    /// or is corrupt. A cache that cannot track its size cannot bound it.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open a cache with an explicit clock for access timestamps.
    pub fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        config.validate()?;
        fs::create_dir_all(&config.root)?;

        let index = CacheIndex::open(&index_path(&config.root))?;

        let mut stats = CacheStats::new();
        stats.update_size(index.total_size()?, index.entry_count()?);

        info!(
            root = %config.root.display(),
            max_storage = config.max_storage,
            size_bytes = stats.size_bytes,
            entries = stats.entry_count,
            "Tile cache opened"
        );

        Ok(Self {
            storage: TileStorage::new(config.root),
            index,
            eviction: LruEviction::new(config.max_storage),
            clock,
            stats: Mutex::new(stats),
        })
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    /// Storage budget in bytes.
    pub fn max_storage(&self) -> u64 {
        self.eviction.max_storage()
    }

    /// Tracked total allocation of all indexed tiles.
    pub fn total_size(&self) -> Result<u64, CacheError> {
        Ok(self.index.total_size()?)
    }

    /// Number of indexed tiles.
    pub fn entry_count(&self) -> Result<u64, CacheError> {
        Ok(self.index.entry_count()?)
    }

    /// Index entry for a tile, if cached.
    pub fn entry(&self, key: &TileKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.index.entry(&key.index_key())?)
    }

    /// Sum of entry sizes recomputed from the index rows.
    ///
    /// Equals [`total_size`](Self::total_size) whenever the index is
    /// consistent. Costs a full table scan.
    pub fn audited_size(&self) -> Result<u64, CacheError> {
        Ok(self.index.summed_size()?)
    }

    fn read(&self, key: &TileKey) -> Option<Vec<u8>> {
        let mut file = match self.storage.open_for_read(key) {
            Ok(file) => file,
            Err(StorageError::NotFound) => return None,
            Err(e) => {
                debug!(tile = %key, error = %e, "Tile unreadable, treating as miss");
                return None;
            }
        };

        match file.read_all() {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(tile = %key, error = %e, "Tile read failed, treating as miss");
                None
            }
        }
    }

    /// Write the tile and describe it, keeping the exclusive lock.
    ///
    /// The returned handle must outlive the index transaction so no other
    /// writer or evictor can touch the file before its row is committed.
    fn write(&self, key: &TileKey, data: &[u8]) -> Option<(LockedFile, CacheEntry)> {
        let path = self.storage.path_for(key);

        let mut file = match self.storage.create_for_write(&path) {
            Ok(file) => file,
            Err(e) => {
                debug!(tile = %key, error = %e, "Cache write skipped");
                self.stats.lock().record_skipped_write();
                return None;
            }
        };

        let size_bytes = match file.write_all(data).and_then(|()| file.allocated_size()) {
            Ok(size) => size,
            Err(e) => {
                warn!(tile = %key, error = %e, "Cache write failed, discarding partial tile");
                let _ = file.unlink();
                self.stats.lock().record_skipped_write();
                return None;
            }
        };

        let entry = CacheEntry {
            address: tile_address(key),
            key: key.index_key(),
            size_bytes,
            last_access: self.clock.now(),
        };
        Some((file, entry))
    }

    /// Record `entry`, evict down to budget and count the remaining tiles,
    /// all in one transaction.
    fn index_and_evict(
        &self,
        file: &LockedFile,
        entry: &CacheEntry,
    ) -> Result<(EvictionOutcome, u64), IndexError> {
        self.index.transaction(|txn| {
            txn.record_insert(entry)?;
            let outcome = self.eviction.run(txn, |victim| {
                if victim.address == entry.address {
                    // Evicting the tile just written; its lock is ours
                    file.unlink()
                } else {
                    self.storage.remove(&victim.address)
                }
            })?;
            Ok((outcome, txn.entry_count()?))
        })
    }
}

impl TileCache for DiskTileCache {
    fn get(&self, key: &TileKey) -> Option<Vec<u8>> {
        let Some(data) = self.read(key) else {
            self.stats.lock().record_miss();
            return None;
        };

        // The bytes are already in hand; a failed bump only skews LRU order
        match self.index.record_access(&key.index_key(), self.clock.now()) {
            Ok(true) => {}
            Ok(false) => debug!(tile = %key, "Tile file present without index entry"),
            Err(e) => warn!(tile = %key, error = %e, "Failed to record tile access"),
        }

        self.stats.lock().record_hit();
        Some(data)
    }

    fn put(&self, key: &TileKey, data: &[u8]) {
        let Some((file, entry)) = self.write(key, data) else {
            return;
        };

        match self.index_and_evict(&file, &entry) {
            Ok((outcome, entries)) => {
                let mut stats = self.stats.lock();
                stats.record_write();
                stats.record_eviction(outcome.evicted, outcome.bytes_freed, outcome.is_stalled());
                stats.update_size(outcome.total_after, entries);
                drop(stats);

                if outcome.evicted > 0 {
                    debug!(
                        tile = %key,
                        evicted = outcome.evicted,
                        bytes_freed = outcome.bytes_freed,
                        size_bytes = outcome.total_after,
                        "Evicted tiles to stay within budget"
                    );
                }
            }
            Err(e) => {
                // Nothing was indexed; don't leave the file behind unaccounted
                error!(tile = %key, error = %e, "Failed to index cached tile");
                let _ = file.unlink();
                self.stats.lock().record_write_failure();
            }
        }
        // Lock released only now, after the row is committed or rolled back
        drop(file);
    }

    fn stats(&self) -> CacheStatistics {
        CacheStatistics::from_stats(&self.stats.lock(), self.max_storage())
    }
}
