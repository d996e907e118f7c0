use std::collections::BTreeMap;

use crate::error::{Result, ShelfError};

/// A contiguous free region of the data area, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    pub start: u64,
    pub size: u64,
}

impl FreeSpace {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// Result of a pool allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub start: u64,
    /// Bytes handed out; can exceed the request when the tail was too small to keep.
    pub size: u64,
    /// Tail split back into the pool, if any.
    pub remainder: Option<FreeSpace>,
}

/// Free block pool with best-fit allocation and coalescing.
///
/// Two ordered maps index the same regions: by `(size, start)` for best fit
/// and by `start` for finding neighbours on release. The pool holds at most
/// `capacity` regions; past that the smallest region is forgotten.
#[derive(Debug)]
pub struct FreeSpaceManager {
    by_size: BTreeMap<(u64, u64), FreeSpace>,
    by_start: BTreeMap<u64, FreeSpace>,
    total_free: u64,
    capacity: usize,
    /// Smallest region worth keeping: anything below cannot hold a block header.
    min_block: u64,
    dropped: u64,
}

impl FreeSpaceManager {
    pub fn new(capacity: usize, min_block: u64) -> Self {
        Self {
            by_size: BTreeMap::new(),
            by_start: BTreeMap::new(),
            total_free: 0,
            capacity: capacity.max(1),
            min_block,
            dropped: 0,
        }
    }

    /// Best-fit allocation of `needed` bytes.
    pub fn allocate(&mut self, needed: u64) -> Option<Allocation> {
        if needed == 0 {
            return None;
        }

        let (&(size, start), _) = self.by_size.range((needed, 0)..).next()?;
        self.by_size.remove(&(size, start));
        self.by_start.remove(&start);
        self.total_free -= size;

        let rest = size - needed;
        if rest >= self.min_block {
            let remainder = FreeSpace {
                start: start + needed,
                size: rest,
            };
            self.insert(remainder);
            Some(Allocation {
                start,
                size: needed,
                remainder: Some(remainder),
            })
        } else {
            Some(Allocation {
                start,
                size,
                remainder: None,
            })
        }
    }

    /// Returns a region to the pool, merged with any adjacent pooled region.
    ///
    /// The merged region is returned so its header can be rewritten on disk.
    pub fn release(&mut self, start: u64, size: u64) -> Result<FreeSpace> {
        if size == 0 {
            return Err(ShelfError::Invalid("cannot release an empty region"));
        }
        if self.overlaps(start, size) {
            return Err(ShelfError::Misc(format!(
                "region at {start} overlaps the free pool"
            )));
        }

        let merged = self.merge_neighbours(start, size);
        self.insert(merged);
        Ok(merged)
    }

    fn overlaps(&self, start: u64, size: u64) -> bool {
        let end = start + size;
        if let Some((_, prev)) = self.by_start.range(..=start).next_back() {
            if prev.end() > start {
                return true;
            }
        }
        matches!(self.by_start.range(start..end).next(), Some(_))
    }

    fn merge_neighbours(&mut self, start: u64, size: u64) -> FreeSpace {
        let mut merged = FreeSpace { start, size };

        let prev = self
            .by_start
            .range(..start)
            .next_back()
            .map(|(_, space)| *space)
            .filter(|space| space.end() == start);
        if let Some(prev) = prev {
            self.take(prev);
            merged.start = prev.start;
            merged.size += prev.size;
        }

        if let Some(next) = self.by_start.get(&(start + size)).copied() {
            self.take(next);
            merged.size += next.size;
        }

        merged
    }

    fn take(&mut self, space: FreeSpace) {
        self.by_size.remove(&(space.size, space.start));
        self.by_start.remove(&space.start);
        self.total_free -= space.size;
    }

    fn insert(&mut self, space: FreeSpace) {
        self.by_size.insert((space.size, space.start), space);
        self.by_start.insert(space.start, space);
        self.total_free += space.size;

        while self.by_start.len() > self.capacity {
            if let Some((_, smallest)) = self.by_size.iter().next().map(|(k, v)| (*k, *v)) {
                self.take(smallest);
                self.dropped += smallest.size;
                tracing::warn!(
                    start = smallest.start,
                    size = smallest.size,
                    "free pool full, dropping smallest region"
                );
            }
        }
    }

    /// Loads regions read back from disk or found by a block scan.
    pub fn load(&mut self, regions: impl IntoIterator<Item = FreeSpace>) {
        for region in regions {
            if region.size == 0 || self.overlaps(region.start, region.size) {
                continue;
            }
            let merged = self.merge_neighbours(region.start, region.size);
            self.insert(merged);
        }
    }

    /// Regions in file order.
    pub fn regions(&self) -> impl Iterator<Item = &FreeSpace> {
        self.by_start.values()
    }

    pub fn contains(&self, start: u64) -> bool {
        self.by_start.contains_key(&start)
    }

    pub fn clear(&mut self) {
        self.by_size.clear();
        self.by_start.clear();
        self.total_free = 0;
        self.dropped = 0;
    }

    pub fn total_free(&self) -> u64 {
        self.total_free
    }

    /// Bytes forgotten because the pool was full; reclaimed only by `optimize`.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn largest(&self) -> u64 {
        self.by_size
            .keys()
            .next_back()
            .map(|(size, _)| *size)
            .unwrap_or(0)
    }

    /// Share of free bytes outside the largest region, in percent.
    pub fn fragmentation(&self) -> u32 {
        if self.total_free == 0 || self.by_start.len() <= 1 {
            return 0;
        }
        (((self.total_free - self.largest()) * 100) / self.total_free) as u32
    }
}
