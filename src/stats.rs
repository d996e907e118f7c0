use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};

/// Declares every counter once; the live and snapshot structs are generated from the list.
macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident,)*) => {
        /// Per-connection operation counters, shared by the engine layers.
        #[derive(Debug, Default)]
        pub struct Statistics {
            $($(#[$doc])* pub $name: AtomicU64,)*
        }

        /// Copy of the counters at one point in time.
        #[derive(Debug, Clone, Default)]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)*
            /// Percentage of cache lookups that hit.
            pub cache_hit_rate: f64,
        }

        impl Statistics {
            pub fn snapshot(&self) -> StatsSnapshot {
                let mut snap = StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                    cache_hit_rate: 0.0,
                };
                snap.cache_hit_rate = hit_rate(snap.cache_hits, snap.cache_misses);
                snap
            }

            /// Zeroes every counter.
            pub fn reset(&self) {
                $(self.$name.store(0, Ordering::Relaxed);)*
            }
        }
    };
}

counters! {
    total_gets,
    total_puts,
    total_deletes,
    /// Range, prefix and iteration passes.
    total_scans,
    cache_hits,
    cache_misses,
    /// Records or pages pushed out of a cache.
    cache_evictions,
    /// Writes queued by `putasync`.
    writes_buffered,
    writes_flushed,
    /// Non-empty drains of the write queue.
    flush_count,
    disk_reads,
    disk_writes,
    disk_bytes_read,
    disk_bytes_written,
    node_splits,
    node_merges,
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    match hits + misses {
        0 => 0.0,
        total => hits as f64 * 100.0 / total as f64,
    }
}

#[inline]
fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_get(&self) {
        bump(&self.total_gets, 1);
    }

    pub fn record_put(&self) {
        bump(&self.total_puts, 1);
    }

    pub fn record_delete(&self) {
        bump(&self.total_deletes, 1);
    }

    pub fn record_scan(&self) {
        bump(&self.total_scans, 1);
    }

    pub fn record_cache(&self, hit: bool) {
        bump(if hit { &self.cache_hits } else { &self.cache_misses }, 1);
    }

    pub fn record_eviction(&self, count: u64) {
        bump(&self.cache_evictions, count);
    }

    pub fn record_write_buffered(&self) {
        bump(&self.writes_buffered, 1);
    }

    /// One drain of the write queue that applied `count` writes.
    pub fn record_write_flushed(&self, count: u64) {
        bump(&self.writes_flushed, count);
        bump(&self.flush_count, 1);
    }

    pub fn record_disk_read(&self, bytes: u64) {
        bump(&self.disk_reads, 1);
        bump(&self.disk_bytes_read, bytes);
    }

    pub fn record_disk_write(&self, bytes: u64) {
        bump(&self.disk_writes, 1);
        bump(&self.disk_bytes_written, bytes);
    }

    pub fn record_split(&self) {
        bump(&self.node_splits, 1);
    }

    pub fn record_merge(&self) {
        bump(&self.node_merges, 1);
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

impl StatsSnapshot {
    /// Multi-line report of the counters, grouped by layer.
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections: [(&str, Vec<(&str, String)>); 5] = [
            (
                "Operations",
                vec![
                    ("Gets", self.total_gets.to_string()),
                    ("Puts", self.total_puts.to_string()),
                    ("Deletes", self.total_deletes.to_string()),
                    ("Scans", self.total_scans.to_string()),
                ],
            ),
            (
                "Cache",
                vec![
                    ("Hit Rate", format!("{:.1}%", self.cache_hit_rate)),
                    ("Hits", self.cache_hits.to_string()),
                    ("Misses", self.cache_misses.to_string()),
                    ("Evictions", self.cache_evictions.to_string()),
                ],
            ),
            (
                "Write Queue",
                vec![
                    ("Queued", self.writes_buffered.to_string()),
                    ("Applied", self.writes_flushed.to_string()),
                    ("Drains", self.flush_count.to_string()),
                ],
            ),
            (
                "Disk I/O",
                vec![
                    (
                        "Reads",
                        format!("{} ({:.2} MiB)", self.disk_reads, mib(self.disk_bytes_read)),
                    ),
                    (
                        "Writes",
                        format!(
                            "{} ({:.2} MiB)",
                            self.disk_writes,
                            mib(self.disk_bytes_written)
                        ),
                    ),
                ],
            ),
            (
                "B-tree",
                vec![
                    ("Splits", self.node_splits.to_string()),
                    ("Merges", self.node_merges.to_string()),
                ],
            ),
        ];

        let mut out = String::from("=== ShelfDB Statistics ===\n");
        for (title, rows) in sections {
            let _ = writeln!(out, "{title}:");
            for (label, value) in rows {
                let _ = writeln!(out, "  {label}: {value}");
            }
        }
        f.write_str(out.trim_end())
    }
}
