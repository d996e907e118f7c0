use std::sync::Arc;

use crate::constants::*;
use crate::stats::Statistics;

/// Buffered `putasync` write.
#[derive(Debug, Clone)]
pub struct WriteEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// In-memory batch of pending overwrites.
///
/// Entries are applied in arrival order by the owning engine, which drains the
/// buffer before serving any other call, so readers never see a state `put`
/// would not have produced.
pub struct WriteBuffer {
    entries: Vec<WriteEntry>,
    size: usize,
    max_entries: usize,
    max_bytes: usize,
    stats: Arc<Statistics>,
}

impl WriteBuffer {
    pub fn new(stats: Arc<Statistics>) -> Self {
        Self::with_limits(ASYNC_BUFFER_ENTRIES, ASYNC_BUFFER_BYTES, stats)
    }

    pub fn with_limits(max_entries: usize, max_bytes: usize, stats: Arc<Statistics>) -> Self {
        Self {
            entries: Vec::new(),
            size: 0,
            max_entries: max_entries.max(1),
            max_bytes,
            stats,
        }
    }

    /// Queues a write; returns true once the batch should be flushed.
    pub fn add_write(&mut self, key: &[u8], value: &[u8]) -> bool {
        self.size += key.len() + value.len();
        self.entries.push(WriteEntry {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self.stats.record_write_buffered();
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_entries || self.size >= self.max_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Takes every pending entry in arrival order.
    pub fn drain(&mut self) -> Vec<WriteEntry> {
        self.size = 0;
        let batch = std::mem::take(&mut self.entries);
        if !batch.is_empty() {
            self.stats.record_write_flushed(batch.len() as u64);
        }
        batch
    }

    /// Puts back entries that could not be applied, ahead of newer ones.
    pub fn restore(&mut self, mut pending: Vec<WriteEntry>) {
        self.size += pending.iter().map(|e| e.key.len() + e.value.len()).sum::<usize>();
        pending.append(&mut self.entries);
        self.entries = pending;
    }
}
