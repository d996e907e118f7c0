use ahash::AHashMap;
use bytes::Bytes;
use std::sync::Arc;

use crate::stats::Statistics;

/// CLOCK record cache bounded by entry count.
///
/// Slots form a ring swept by a hand; a hit sets the slot's reference bit and
/// the hand clears bits until it finds an unreferenced slot to reuse.
pub struct ClockCache {
    slots: Vec<Slot>,
    index: AHashMap<Vec<u8>, usize>,
    hand: usize,
    capacity: usize,
    stats: Arc<Statistics>,
}

struct Slot {
    key: Vec<u8>,
    value: Bytes,
    reference: bool,
}

impl ClockCache {
    pub fn new(capacity: usize, stats: Arc<Statistics>) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(4096)),
            index: AHashMap::new(),
            hand: 0,
            capacity,
            stats,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&mut self, key: &[u8]) -> Option<Bytes> {
        let hit = self.index.get(key).map(|&idx| {
            let slot = &mut self.slots[idx];
            slot.reference = true;
            slot.value.clone()
        });
        self.stats.record_cache(hit.is_some());
        hit
    }

    pub fn insert(&mut self, key: &[u8], value: Bytes) {
        if self.capacity == 0 {
            return;
        }
        if let Some(&idx) = self.index.get(key) {
            let slot = &mut self.slots[idx];
            slot.value = value;
            slot.reference = true;
            return;
        }

        if self.slots.len() < self.capacity {
            self.index.insert(key.to_vec(), self.slots.len());
            self.slots.push(Slot {
                key: key.to_vec(),
                value,
                reference: false,
            });
            return;
        }

        let victim = self.sweep();
        let slot = &mut self.slots[victim];
        self.index.remove(&slot.key);
        slot.key = key.to_vec();
        slot.value = value;
        slot.reference = false;
        self.index.insert(key.to_vec(), victim);
        self.stats.record_eviction(1);
    }

    /// Advances the hand to the first unreferenced slot.
    fn sweep(&mut self) -> usize {
        loop {
            let idx = self.hand;
            self.hand = (self.hand + 1) % self.slots.len();
            let slot = &mut self.slots[idx];
            if slot.reference {
                slot.reference = false;
            } else {
                return idx;
            }
        }
    }

    pub fn remove(&mut self, key: &[u8]) {
        if let Some(idx) = self.index.remove(key) {
            let last = self.slots.len() - 1;
            self.slots.swap_remove(idx);
            if idx != last {
                let moved = self.slots[idx].key.clone();
                self.index.insert(moved, idx);
            }
            if self.hand >= self.slots.len() {
                self.hand = 0;
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.hand = 0;
    }
}
