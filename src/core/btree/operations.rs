use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::core::options::{BTreeRetune, BTreeTuning, OpenMode};
use crate::error::{Result, ShelfError};
use crate::stats::StatsSnapshot;

use super::meta::TreeMeta;
use super::{BTreeDb, BTreeDbBuilder, Bound, Cursor, TreeCore, TreePut};

impl BTreeDb {
    pub fn builder() -> BTreeDbBuilder {
        BTreeDbBuilder::new()
    }

    /// Opens with default tuning, cache sizes and lexical ordering.
    ///
    /// # Errors
    ///
    /// * `NoFile` - The file is missing and `mode` does not create it
    /// * `Meta` - The file is not a B-tree database, or was created with a
    ///   custom comparator
    /// * `Lock` - The file lock could not be taken
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        BTreeDbBuilder::new().open(path, mode)
    }

    /// Stores a record, replacing every existing value of the key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.lock().put(key, value, TreePut::Overwrite)?;
        Ok(())
    }

    /// Stores a record only if the key is absent; `Ok(false)` otherwise.
    pub fn putkeep(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.lock().put(key, value, TreePut::Keep)
    }

    /// Appends `value` to the first value of the key, or stores a new record.
    pub fn putcat(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.lock().put(key, value, TreePut::Concat)?;
        Ok(())
    }

    /// Adds `value` after the existing values of the key.
    pub fn putdup(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.lock().put(key, value, TreePut::Dup)?;
        Ok(())
    }

    /// Adds every value of `values` after the existing values of the key.
    pub fn putlist(&self, key: &[u8], values: &[&[u8]]) -> Result<()> {
        self.lock().putlist(key, values)
    }

    /// Removes the first value of a key.
    ///
    /// # Errors
    ///
    /// * `NoRecord` - The key does not exist
    pub fn out(&self, key: &[u8]) -> Result<()> {
        if self.lock().out(key)? {
            Ok(())
        } else {
            Err(ShelfError::NoRecord)
        }
    }

    /// Removes a key with all of its values.
    ///
    /// # Errors
    ///
    /// * `NoRecord` - The key does not exist
    pub fn outlist(&self, key: &[u8]) -> Result<()> {
        if self.lock().outlist(key)? {
            Ok(())
        } else {
            Err(ShelfError::NoRecord)
        }
    }

    /// First value of a key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.lock().get(key)
    }

    /// Every value of a key in insertion order.
    pub fn getlist(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        self.lock().getlist(key)
    }

    /// Number of values of a key, 0 when absent.
    pub fn vnum(&self, key: &[u8]) -> Result<usize> {
        self.lock().vnum(key)
    }

    /// Size of the first value of a key.
    pub fn vsiz(&self, key: &[u8]) -> Result<Option<usize>> {
        self.lock().vsiz(key)
    }

    /// Keys between `lower` and `upper` in order, at most `max` of them.
    ///
    /// A `None` bound leaves that end of the range open. Each key appears
    /// once however many values it holds.
    pub fn range(
        &self,
        lower: Option<Bound<'_>>,
        upper: Option<Bound<'_>>,
        max: Option<usize>,
    ) -> Result<Vec<Bytes>> {
        self.lock().range(lower, upper, max)
    }

    /// Keys beginning with `prefix` in order, at most `max` of them.
    pub fn fwmkeys(&self, prefix: &[u8], max: Option<usize>) -> Result<Vec<Bytes>> {
        self.lock().fwmkeys(prefix, max)
    }

    /// New unpositioned cursor.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// Begins a transaction owned by the calling thread.
    ///
    /// Until it ends, calls from other threads wait.
    ///
    /// # Errors
    ///
    /// * `Invalid` - A transaction is already active
    pub fn tran_begin(&self) -> Result<()> {
        self.lock().begin()
    }

    /// Commits the active transaction and syncs the file.
    pub fn tran_commit(&self) -> Result<()> {
        let result = self.lock().commit();
        self.tran_cv.notify_all();
        result
    }

    /// Discards every change made since [`tran_begin`](Self::tran_begin).
    pub fn tran_abort(&self) -> Result<()> {
        let result = self.lock().abort();
        self.tran_cv.notify_all();
        result
    }

    /// Writes dirty pages and metadata, then syncs the file.
    pub fn sync(&self) -> Result<()> {
        self.lock().sync()
    }

    /// Rebuilds the file with new tuning. `None` keeps the current value.
    ///
    /// # Errors
    ///
    /// * `Invalid` - Called on a reader or inside a transaction
    pub fn optimize(&self, retune: BTreeRetune) -> Result<()> {
        let mut core = self.lock();
        core.ensure_writer()?;
        core.ensure_no_transaction()?;
        core.flush()?;

        let current = core.hash.tuning();
        let tuning = BTreeTuning {
            lmemb: retune.lmemb.unwrap_or(core.lmemb()),
            nmemb: retune.nmemb.unwrap_or(core.nmemb()),
            bnum: match retune.bnum {
                Some(0) => (core.hash.rnum() * 2).max(DEFAULT_BNUM),
                Some(bnum) => bnum,
                None => current.bnum,
            },
            apow: retune.apow.unwrap_or(current.apow),
            fpow: retune.fpow.unwrap_or(current.fpow),
            opts: retune.opts.unwrap_or(current.opts),
        }
        .normalized();

        let (tmp, sibling) = core
            .hash
            .create_sibling(EngineKind::BTree, tuning.hash_tuning())?;
        let cmp = core.cmp.clone();
        let cache = core.cache_sizes();
        let rebuilt = TreeCore::attach(sibling, cmp, tuning, cache).and_then(|mut sibling| {
            core.for_each_entry(|entry| {
                sibling.append_values(entry.key.clone(), entry.values.clone())?;
                Ok(true)
            })?;
            sibling.into_hash()
        });
        let rebuilt = match rebuilt {
            Ok(hash) => hash,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(e);
            }
        };

        core.forget_pages();
        core.hash.adopt(&tmp, rebuilt)?;
        let meta = TreeMeta::decode(&core.hash.store().header().opaque)?;
        core.meta = meta;
        core.bump();
        tracing::debug!(
            path = %core.hash.path().display(),
            lmemb = tuning.lmemb,
            nmemb = tuning.nmemb,
            rnum = core.rnum(),
            "optimized B-tree database"
        );
        Ok(())
    }

    /// Removes every record.
    pub fn vanish(&self) -> Result<()> {
        let mut core = self.lock();
        core.ensure_no_transaction()?;
        core.vanish()
    }

    /// Writes a synced byte copy of the database to `dest`.
    pub fn copy(&self, dest: impl AsRef<Path>) -> Result<()> {
        let mut core = self.lock();
        core.ensure_no_transaction()?;
        core.flush()?;
        core.hash.copy_to(dest.as_ref())
    }

    /// Syncs, then hands the database path to `hook` while the connection is held.
    pub fn copy_with<F>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let mut core = self.lock();
        core.ensure_no_transaction()?;
        if core.hash.store().is_writer() {
            core.sync()?;
        }
        let path = core.hash.path();
        hook(&path)
    }

    pub fn path(&self) -> PathBuf {
        self.lock().hash.path()
    }

    /// Number of stored values, duplicates included.
    pub fn rnum(&self) -> u64 {
        self.lock().rnum()
    }

    pub fn fsiz(&self) -> u64 {
        self.lock().fsiz()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Writes everything back and releases the file; an active transaction is aborted.
    pub fn close(mut self) -> Result<()> {
        self.core.get_mut().shutdown()
    }
}
