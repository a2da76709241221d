//! Behavioral tests for the disk tile cache.
//!
//! Block allocation differs between filesystems, so budgets are expressed
//! in multiples of the allocation of one tile, measured on the filesystem
//! the test runs on.

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;
use tilecache::cache::{tile_path, CacheConfig, DiskTileCache, TileCache, TileKey};
use tilecache::time::ManualClock;

const TILE_BYTES: usize = 4096;

fn tile(fill: u8) -> Vec<u8> {
    vec![fill; TILE_BYTES]
}

/// Allocation of one `TILE_BYTES` tile on the test filesystem.
fn unit_size() -> u64 {
    let temp_dir = TempDir::new().unwrap();
    let cache = DiskTileCache::open(CacheConfig::new(temp_dir.path(), u64::MAX)).unwrap();
    let key = TileKey::new(0, 0, 0);
    cache.put(&key, &tile(0));
    cache.entry(&key).unwrap().unwrap().size_bytes
}

fn open(
    temp_dir: &TempDir,
    max_storage: u64,
    clock: &Arc<ManualClock>,
) -> DiskTileCache {
    DiskTileCache::open_with_clock(
        CacheConfig::new(temp_dir.path(), max_storage),
        clock.clone(),
    )
    .unwrap()
}

#[test]
fn test_three_tiles_evict_the_first() {
    let unit = unit_size();
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    // Two tiles fit, three do not
    let cache = open(&temp_dir, unit * 5 / 2, &clock);

    let first = TileKey::new(0, 0, 5);
    let second = TileKey::new(1, 0, 5);
    let third = TileKey::new(2, 0, 5);

    cache.put(&first, &tile(1));
    assert_eq!(cache.total_size().unwrap(), unit);

    clock.advance(1);
    cache.put(&second, &tile(2));
    assert_eq!(cache.total_size().unwrap(), 2 * unit);

    clock.advance(1);
    cache.put(&third, &tile(3));
    assert_eq!(cache.total_size().unwrap(), 2 * unit);
    assert_eq!(cache.entry_count().unwrap(), 2);

    assert_eq!(cache.get(&first), None);
    assert!(!tile_path(cache.root(), &first).exists());
    assert_eq!(cache.get(&second), Some(tile(2)));
    assert_eq!(cache.get(&third), Some(tile(3)));

    let stats = cache.stats();
    assert_eq!(stats.stats.evictions, 1);
    assert_eq!(stats.stats.bytes_evicted, unit);
}

#[test]
fn test_get_refreshes_recency() {
    let unit = unit_size();
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let cache = open(&temp_dir, unit * 7 / 2, &clock);

    let a = TileKey::new(10, 10, 12);
    let b = TileKey::new(11, 10, 12);
    let c = TileKey::new(12, 10, 12);
    let d = TileKey::new(13, 10, 12);

    cache.put(&a, &tile(b'a'));
    clock.advance(1);
    cache.put(&b, &tile(b'b'));
    clock.advance(1);
    cache.put(&c, &tile(b'c'));
    clock.advance(1);
    assert_eq!(cache.get(&a), Some(tile(b'a')));
    clock.advance(1);
    cache.put(&d, &tile(b'd'));

    assert_eq!(cache.entry_count().unwrap(), 3);
    assert!(cache.entry(&b).unwrap().is_none());
    assert_eq!(cache.get(&a), Some(tile(b'a')));
    assert_eq!(cache.get(&b), None);
    assert_eq!(cache.get(&c), Some(tile(b'c')));
    assert_eq!(cache.get(&d), Some(tile(b'd')));
}

#[test]
fn test_empty_cache_misses() {
    let temp_dir = TempDir::new().unwrap();
    let cache = DiskTileCache::open(CacheConfig::new(temp_dir.path(), 1_000_000)).unwrap();

    for key in [TileKey::new(0, 0, 0), TileKey::new(5, 9, 4), TileKey::new(u32::MAX, 1, 20)] {
        assert_eq!(cache.get(&key), None);
    }
    assert_eq!(cache.stats().stats.misses, 3);
    assert_eq!(cache.total_size().unwrap(), 0);
}

#[test]
fn test_round_trip_preserves_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let cache = DiskTileCache::open(CacheConfig::new(temp_dir.path(), 10_000_000)).unwrap();
    let key = TileKey::new(8, 3, 4);
    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    cache.put(&key, &data);

    assert_eq!(cache.get(&key), Some(data));
}

#[test]
fn test_repeated_reads_do_not_change_total() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let cache = open(&temp_dir, 10_000_000, &clock);
    let key = TileKey::new(2, 2, 2);
    cache.put(&key, b"stable");
    let total = cache.total_size().unwrap();

    for _ in 0..5 {
        clock.advance(10);
        assert_eq!(cache.get(&key), Some(b"stable".to_vec()));
        assert_eq!(cache.total_size().unwrap(), total);
    }
    assert_eq!(cache.audited_size().unwrap(), total);
}

#[test]
fn test_concurrent_put_same_key() {
    let temp_dir = TempDir::new().unwrap();
    let config = CacheConfig::new(temp_dir.path(), 10_000_000);
    let key = TileKey::new(42, 17, 9);
    let barrier = Arc::new(Barrier::new(2));

    // Separate instances, as two processes sharing a root would have
    let handles: Vec<_> = [b'x', b'y']
        .into_iter()
        .map(|fill| {
            let cache = DiskTileCache::open(config.clone()).unwrap();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.put(&key, &tile(fill));
                cache.stats().stats
            })
        })
        .collect();
    let stats: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Each put either wrote or was skipped; at least one wrote
    let writes: u64 = stats.iter().map(|s| s.writes).sum();
    let skipped: u64 = stats.iter().map(|s| s.skipped_writes).sum();
    assert_eq!(writes + skipped, 2);
    assert!(writes >= 1);
    assert!(stats.iter().all(|s| s.write_failures == 0));

    let cache = DiskTileCache::open(config).unwrap();
    let entry = cache.entry(&key).unwrap().unwrap();
    assert_eq!(cache.entry_count().unwrap(), 1);
    assert_eq!(cache.total_size().unwrap(), entry.size_bytes);

    let data = cache.get(&key).unwrap();
    assert!(data == tile(b'x') || data == tile(b'y'));
}

#[test]
fn test_put_during_foreign_write_is_skipped() {
    use tilecache::cache::TileStorage;

    let temp_dir = TempDir::new().unwrap();
    let cache = DiskTileCache::open(CacheConfig::new(temp_dir.path(), 10_000_000)).unwrap();
    let key = TileKey::new(3, 3, 3);

    let storage = TileStorage::new(temp_dir.path());
    let mut writer = storage.create_for_write(&storage.path_for(&key)).unwrap();
    writer.write_all(&tile(1)).unwrap();

    cache.put(&key, &tile(2));

    assert_eq!(cache.entry_count().unwrap(), 0);
    assert_eq!(cache.total_size().unwrap(), 0);
    assert_eq!(cache.stats().stats.skipped_writes, 1);
    drop(writer);
    assert_eq!(cache.get(&key), Some(tile(1)));
}

#[test]
fn test_zero_budget_evicts_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let cache = DiskTileCache::open(CacheConfig::new(temp_dir.path(), 0)).unwrap();
    let key = TileKey::new(1, 1, 1);

    cache.put(&key, &tile(9));

    assert_eq!(cache.total_size().unwrap(), 0);
    assert_eq!(cache.entry_count().unwrap(), 0);
    assert!(!tile_path(cache.root(), &key).exists());
    assert_eq!(cache.get(&key), None);

    let stats = cache.stats();
    assert_eq!(stats.stats.writes, 1);
    assert_eq!(stats.stats.evictions, 1);
    assert_eq!(stats.stats.eviction_stalls, 0);
}

#[test]
fn test_total_stays_within_budget() {
    let unit = unit_size();
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let max_storage = unit * 4;
    let cache = open(&temp_dir, max_storage, &clock);

    for i in 0..20u32 {
        clock.advance(1);
        cache.put(&TileKey::new(i % 7, i, 10), &tile(i as u8));
        let total = cache.total_size().unwrap();
        assert!(total <= max_storage, "total {total} over budget {max_storage}");
        assert_eq!(cache.audited_size().unwrap(), total);
    }
    assert_eq!(cache.stats().stats.eviction_stalls, 0);
}

#[test]
fn test_failed_deletion_exceeds_budget_until_next_put() {
    let unit = unit_size();
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let max_storage = unit * 5 / 2;
    let cache = open(&temp_dir, max_storage, &clock);

    let oldest = TileKey::new(0, 0, 7);
    cache.put(&oldest, &tile(1));
    clock.advance(1);
    cache.put(&TileKey::new(1, 0, 7), &tile(2));

    // Pull the oldest tile's file out from under the cache
    let oldest_path = tile_path(cache.root(), &oldest);
    fs::remove_file(&oldest_path).unwrap();

    clock.advance(1);
    cache.put(&TileKey::new(2, 0, 7), &tile(3));

    assert_eq!(cache.total_size().unwrap(), 3 * unit);
    assert!(cache.total_size().unwrap() > max_storage);
    assert!(cache.entry(&oldest).unwrap().is_some());
    assert_eq!(cache.stats().stats.eviction_stalls, 1);

    // Once the file can be deleted again the next put catches up
    fs::write(&oldest_path, tile(1)).unwrap();
    clock.advance(1);
    cache.put(&TileKey::new(3, 0, 7), &tile(4));

    assert!(cache.total_size().unwrap() <= max_storage);
    assert!(cache.entry(&oldest).unwrap().is_none());
    assert_eq!(cache.audited_size().unwrap(), cache.total_size().unwrap());
}
