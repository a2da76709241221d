//! Cache trait definition for dependency injection.

use crate::cache::key::TileKey;
use crate::cache::stats::{CacheStatistics, CacheStats};

/// Tile cache contract shared by tile fetchers and renderers.
///
/// A miss is a normal outcome, not an error, and writes are best effort:
/// callers must treat the cache purely as an optimisation.
///
/// # Example
///
/// ```
/// use tilecache::cache::{NoOpCache, TileCache, TileKey};
///
/// fn load(cache: &dyn TileCache, key: TileKey) -> Vec<u8> {
///     if let Some(bytes) = cache.get(&key) {
///         return bytes;
///     }
///     let bytes = vec![0x89, b'P', b'N', b'G']; // fetched elsewhere
///     cache.put(&key, &bytes);
///     bytes
/// }
///
/// assert_eq!(load(&NoOpCache, TileKey::new(0, 0, 0)).len(), 4);
/// ```
pub trait TileCache: Send + Sync {
    /// Cached bytes for `key`, or `None` on a miss.
    fn get(&self, key: &TileKey) -> Option<Vec<u8>>;

    /// Store `data` for `key`. Never fails; a dropped write just means the
    /// tile is fetched again next time.
    fn put(&self, key: &TileKey, data: &[u8]);

    /// Snapshot of cache statistics.
    fn stats(&self) -> CacheStatistics;
}

/// Cache that never stores anything.
///
/// Useful for running a fetcher or renderer with caching disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

impl TileCache for NoOpCache {
    fn get(&self, _key: &TileKey) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &TileKey, _data: &[u8]) {}

    fn stats(&self) -> CacheStatistics {
        CacheStatistics::from_stats(&CacheStats::new(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_cache_always_misses() {
        let cache = NoOpCache;
        let key = TileKey::new(100, 200, 15);

        cache.put(&key, &[1, 2, 3]);
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_noop_cache_stats_are_empty() {
        let stats = NoOpCache.stats();
        assert_eq!(stats.stats.hits, 0);
        assert_eq!(stats.stats.entry_count, 0);
        assert_eq!(stats.max_storage, 0);
    }

    #[test]
    fn test_noop_cache_as_trait_object() {
        let cache: Box<dyn TileCache> = Box::new(NoOpCache);
        assert!(cache.get(&TileKey::new(0, 0, 0)).is_none());
    }
}
