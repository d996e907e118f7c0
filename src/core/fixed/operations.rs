use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::core::hash::PutMode;
use crate::core::options::{FixedTuning, OpenMode};
use crate::error::{Result, ShelfError};
use crate::stats::StatsSnapshot;

use super::{FixedDb, FixedDbBuilder, FixedKey};

impl FixedDb {
    pub fn builder() -> FixedDbBuilder {
        FixedDbBuilder::new()
    }

    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        FixedDbBuilder::new().open(path, mode)
    }

    /// Stores a record, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// * `Invalid` - The value is wider than the slot, the id is out of
    ///   range, or a relative key has no record to refer to
    pub fn put(&self, key: impl Into<FixedKey>, value: &[u8]) -> Result<()> {
        self.core.lock().put(key.into(), value, PutMode::Overwrite)?;
        Ok(())
    }

    /// Stores a record only if the slot is empty; `Ok(false)` otherwise.
    pub fn putkeep(&self, key: impl Into<FixedKey>, value: &[u8]) -> Result<bool> {
        self.core.lock().put(key.into(), value, PutMode::Keep)
    }

    /// Appends to the existing value, or stores a new record.
    ///
    /// The joined value must still fit the slot.
    pub fn putcat(&self, key: impl Into<FixedKey>, value: &[u8]) -> Result<()> {
        self.core.lock().put(key.into(), value, PutMode::Concat)?;
        Ok(())
    }

    /// Clears a slot.
    ///
    /// # Errors
    ///
    /// * `NoRecord` - The slot is empty
    pub fn out(&self, key: impl Into<FixedKey>) -> Result<()> {
        if self.core.lock().remove(key.into())? {
            Ok(())
        } else {
            Err(ShelfError::NoRecord)
        }
    }

    pub fn get(&self, key: impl Into<FixedKey>) -> Result<Option<Bytes>> {
        self.core.lock().get(key.into())
    }

    pub fn vsiz(&self, key: impl Into<FixedKey>) -> Result<Option<usize>> {
        self.core.lock().vsiz(key.into())
    }

    /// Resets the id iterator to the smallest live id.
    pub fn iter_init(&self) {
        self.core.lock().iter_init()
    }

    /// Next live id in ascending order, `None` once exhausted.
    pub fn iter_next(&self) -> Option<u64> {
        self.core.lock().iter_next()
    }

    /// Live ids inside `interval`, at most `max` of them.
    ///
    /// `interval` is `"[a,b]"`, `"(a,b)"`, a mix of the two, or a single id;
    /// `a` and `b` may be `min` or `max`.
    ///
    /// # Errors
    ///
    /// * `Invalid` - The interval is malformed
    pub fn range(&self, interval: &str, max: Option<usize>) -> Result<Vec<u64>> {
        self.core.lock().range(interval, max)
    }

    /// Live ids in `lower..=upper`, at most `max` of them.
    pub fn range_ids(&self, lower: u64, upper: u64, max: Option<usize>) -> Vec<u64> {
        self.core.lock().range_ids(lower, upper, max)
    }

    pub fn sync(&self) -> Result<()> {
        self.core.lock().sync()
    }

    /// Rewrites the file with new geometry; 0 keeps the current value.
    pub fn optimize(&self, width: u32, limsiz: u64) -> Result<()> {
        let mut core = self.core.lock();
        let header = *core.header();
        let tuning = FixedTuning {
            width: if width == 0 { header.width } else { width },
            limsiz: if limsiz == 0 { header.limsiz } else { limsiz },
        };
        core.optimize(tuning)
    }

    pub fn vanish(&self) -> Result<()> {
        self.core.lock().vanish()
    }

    pub fn copy(&self, dest: impl AsRef<Path>) -> Result<()> {
        self.core.lock().copy_to(dest.as_ref())
    }

    /// Syncs, then hands the database path to `hook` while the connection is held.
    pub fn copy_with<F>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let mut core = self.core.lock();
        if core.is_writer() {
            core.sync()?;
        }
        let path = core.path().to_path_buf();
        hook(&path)
    }

    pub fn path(&self) -> PathBuf {
        self.core.lock().path().to_path_buf()
    }

    pub fn rnum(&self) -> u64 {
        self.core.lock().rnum()
    }

    pub fn fsiz(&self) -> u64 {
        self.core.lock().fsiz()
    }

    /// Slot width in bytes.
    pub fn width(&self) -> u32 {
        self.core.lock().width()
    }

    /// Largest usable id.
    pub fn limit(&self) -> u64 {
        self.core.lock().limit()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn close(self) -> Result<()> {
        self.core.into_inner().close()
    }
}
