//! Cache statistics tracking and reporting.

use std::time::Instant;

use crate::config::format_size;

/// Running counters for one cache instance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Writes dropped because the tile was locked or could not be created
    pub skipped_writes: u64,
    /// Writes that reached the disk but could not be indexed
    pub write_failures: u64,
    pub evictions: u64,
    pub bytes_evicted: u64,
    /// Eviction passes that stopped on a failed deletion
    pub eviction_stalls: u64,

    // Last observed index state
    pub size_bytes: u64,
    pub entry_count: u64,

    pub created_at: Instant,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    /// Create a new statistics tracker.
    pub fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            writes: 0,
            skipped_writes: 0,
            write_failures: 0,
            evictions: 0,
            bytes_evicted: 0,
            eviction_stalls: 0,
            size_bytes: 0,
            entry_count: 0,
            created_at: Instant::now(),
        }
    }

    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Time since statistics started.
    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_skipped_write(&mut self) {
        self.skipped_writes += 1;
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    /// Record the result of one eviction pass.
    pub fn record_eviction(&mut self, count: u64, bytes: u64, stalled: bool) {
        self.evictions += count;
        self.bytes_evicted += bytes;
        if stalled {
            self.eviction_stalls += 1;
        }
    }

    /// Update the last observed index size.
    pub fn update_size(&mut self, size_bytes: u64, entry_count: u64) {
        self.size_bytes = size_bytes;
        self.entry_count = entry_count;
    }
}

/// Snapshot of cache statistics for reporting.
#[derive(Debug, Clone)]
pub struct CacheStatistics {
    pub stats: CacheStats,
    pub max_storage: u64,
    pub hit_rate_percent: f64,
    pub uptime_secs: u64,
}

impl CacheStatistics {
    /// Create a snapshot from current stats.
    pub fn from_stats(stats: &CacheStats, max_storage: u64) -> Self {
        Self {
            stats: stats.clone(),
            max_storage,
            hit_rate_percent: stats.hit_rate() * 100.0,
            uptime_secs: stats.uptime().as_secs(),
        }
    }

    /// Format statistics as a human-readable report.
    pub fn format(&self) -> String {
        let stats = &self.stats;

        format!(
            r#"Tile Cache Statistics

STORAGE
  Entries:     {}
  Size:        {}
  Budget:      {}

TRAFFIC
  Hits:        {}
  Misses:      {}
  Hit Rate:    {:.1}%
  Writes:      {}
  Skipped:     {}
  Failures:    {}

EVICTION
  Evicted:     {}
  Freed:       {}
  Stalls:      {}

Uptime:        {}s
"#,
            stats.entry_count,
            format_size(stats.size_bytes),
            format_size(self.max_storage),
            stats.hits,
            stats.misses,
            self.hit_rate_percent,
            stats.writes,
            stats.skipped_writes,
            stats.write_failures,
            stats.evictions,
            format_size(stats.bytes_evicted),
            stats.eviction_stalls,
            self.uptime_secs,
        )
    }
}
