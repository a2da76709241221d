//! Least-recently-accessed eviction.
//!
//! Runs synchronously inside the `put` transaction, right after the new
//! tile is recorded. Each step removes the globally oldest tile (file
//! first, then its row) until the tracked total fits the budget.
//!
//! If deleting a file fails (including when another handle holds its lock)
//! the loop stops at once and reports the entry.
//! The row is kept so the file can still be found, and the same failing
//! entry is never retried in a loop. The total may then stay over budget
//! until a later `put` manages to evict.

use tracing::{debug, warn};

use crate::cache::index::{IndexError, IndexTxn};
use crate::cache::storage::StorageError;
use crate::cache::types::CacheEntry;

/// Result of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Tiles removed
    pub evicted: u64,
    /// Allocation freed by the removed tiles
    pub bytes_freed: u64,
    /// Tracked total when the pass ended
    pub total_after: u64,
    /// Entry whose file could not be deleted, if the pass stalled
    pub stalled: Option<CacheEntry>,
}

impl EvictionOutcome {
    /// Whether the pass stopped on a failed deletion.
    pub fn is_stalled(&self) -> bool {
        self.stalled.is_some()
    }
}

/// LRU eviction against a fixed storage budget.
#[derive(Debug, Clone, Copy)]
pub struct LruEviction {
    max_storage: u64,
}

impl LruEviction {
    /// Create a policy for the given budget in bytes.
    pub fn new(max_storage: u64) -> Self {
        Self { max_storage }
    }

    /// Budget in bytes.
    pub fn max_storage(&self) -> u64 {
        self.max_storage
    }

    /// Evict oldest entries until the total is within budget.
    ///
    /// `remove` deletes the backing file of an entry. Index errors abort
    /// the pass and, with it, the surrounding transaction.
    pub fn run<F>(&self, txn: &IndexTxn<'_>, mut remove: F) -> Result<EvictionOutcome, IndexError>
    where
        F: FnMut(&CacheEntry) -> Result<(), StorageError>,
    {
        let mut outcome = EvictionOutcome::default();

        loop {
            let total = txn.total_size()?;
            outcome.total_after = total;

            if total <= self.max_storage {
                break;
            }

            let Some(oldest) = txn.select_oldest()? else {
                warn!(
                    total,
                    max_storage = self.max_storage,
                    "Cache total over budget with no tiles left to evict"
                );
                break;
            };

            match remove(&oldest) {
                Ok(()) => {
                    txn.record_delete(&oldest)?;
                    outcome.evicted += 1;
                    outcome.bytes_freed += oldest.size_bytes;
                    debug!(
                        address = %oldest.address,
                        size_bytes = oldest.size_bytes,
                        last_access = oldest.last_access,
                        "Evicted tile"
                    );
                }
                Err(e) => {
                    warn!(
                        address = %oldest.address,
                        error = %e,
                        total,
                        max_storage = self.max_storage,
                        "Eviction stalled: could not delete oldest tile"
                    );
                    outcome.stalled = Some(oldest);
                    break;
                }
            }
        }

        Ok(outcome)
    }
}
