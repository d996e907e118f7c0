use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::core::options::{HashRetune, HashTuning, OpenMode};
use crate::error::Result;
use crate::stats::StatsSnapshot;

use super::{HashCore, HashDb, HashDbBuilder, HashIter, PutMode};

impl HashDb {
    /// Builder for tuning and cache settings.
    pub fn builder() -> HashDbBuilder {
        HashDbBuilder::new()
    }

    /// Opens with default tuning and no record cache.
    ///
    /// # Errors
    ///
    /// * `NoFile` - The file is missing and `mode` does not create it
    /// * `Meta` - The file is not a hash database
    /// * `Lock` - The file lock could not be taken
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        HashDbBuilder::new().open(path, mode)
    }

    /// Stores a record, overwriting any existing value.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use shelfdb::{HashDb, OpenMode};
    /// # fn main() -> shelfdb::Result<()> {
    /// # let db = HashDb::open("casket.shh", OpenMode::create())?;
    /// db.put(b"user:1", b"alice")?;
    /// db.put(b"user:1", b"bob")?;
    /// assert_eq!(db.get(b"user:1")?.as_deref(), Some(&b"bob"[..]));
    /// # Ok(())
    /// # }
    /// ```
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.core.lock().put(key, value, PutMode::Overwrite)?;
        Ok(())
    }

    /// Stores a record only if the key is absent.
    ///
    /// Returns `Ok(false)` and leaves the stored value alone when the key exists.
    pub fn putkeep(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.core.lock().put(key, value, PutMode::Keep)
    }

    /// Appends `value` to the existing value, or stores it as a new record.
    pub fn putcat(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.core.lock().put(key, value, PutMode::Concat)?;
        Ok(())
    }

    /// Buffers an overwrite for a batched write.
    ///
    /// Observable state is identical to [`put`](Self::put): the batch is
    /// applied before any other call on this connection is served.
    pub fn putasync(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.core.lock().put_async(key, value)
    }

    /// Removes a record.
    ///
    /// # Errors
    ///
    /// * `NoRecord` - The key does not exist
    pub fn out(&self, key: &[u8]) -> Result<()> {
        if self.core.lock().remove(key)? {
            Ok(())
        } else {
            Err(crate::error::ShelfError::NoRecord)
        }
    }

    /// Retrieves the value of a record, `None` if the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.core.lock().get(key)
    }

    /// Size of the value of a record, `None` if the key is absent.
    pub fn vsiz(&self, key: &[u8]) -> Result<Option<usize>> {
        self.core.lock().vsiz(key)
    }

    /// Resets the connection's key iterator to the first record.
    pub fn iter_init(&self) -> Result<()> {
        self.core.lock().iter_init()
    }

    /// Next key of the connection's iterator, `None` once exhausted.
    ///
    /// Every record is returned exactly once per pass if the database is not
    /// modified during the pass.
    pub fn iter_next(&self) -> Result<Option<Bytes>> {
        self.core.lock().iter_next()
    }

    /// Iterator over `(key, value)` pairs independent of [`iter_init`](Self::iter_init).
    pub fn iter(&self) -> HashIter<'_> {
        HashIter::new(self)
    }

    /// Keys beginning with `prefix`, at most `max` of them.
    ///
    /// This is a full scan; the result is empty when nothing matches.
    pub fn fwmkeys(&self, prefix: &[u8], max: Option<usize>) -> Result<Vec<Bytes>> {
        self.core.lock().fwmkeys(prefix, max)
    }

    /// Applies buffered writes, persists the free pool and syncs the file.
    pub fn sync(&self) -> Result<()> {
        self.core.lock().sync()
    }

    /// Rebuilds the file with new tuning, dropping fragmentation.
    ///
    /// `None` keeps the current value. `Some(0)` for `bnum` selects twice the
    /// record count (at least 16381).
    pub fn optimize(&self, retune: HashRetune) -> Result<()> {
        let mut core = self.core.lock();
        core.store().ensure_writer()?;
        core.flush_async()?;

        let current = core.tuning();
        let tuning = HashTuning {
            bnum: match retune.bnum {
                Some(0) => (core.rnum() * 2).max(DEFAULT_BNUM),
                Some(bnum) => bnum,
                None => current.bnum,
            },
            apow: retune.apow.unwrap_or(current.apow),
            fpow: retune.fpow.unwrap_or(current.fpow),
            opts: retune.opts.unwrap_or(current.opts),
        }
        .normalized();

        let (tmp, mut sibling) = core.create_sibling(EngineKind::Hash, tuning)?;
        let copied = core.scan(|key, value| {
            sibling.put(&key, &value, PutMode::Overwrite)?;
            Ok(true)
        });
        if let Err(e) = copied {
            drop(sibling);
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        core.adopt(&tmp, sibling)?;
        tracing::debug!(
            path = %core.path().display(),
            bnum = tuning.bnum,
            rnum = core.rnum(),
            "optimized hash database"
        );
        Ok(())
    }

    /// Removes every record.
    pub fn vanish(&self) -> Result<()> {
        self.core.lock().vanish()
    }

    /// Writes a synced byte copy of the database to `dest`.
    pub fn copy(&self, dest: impl AsRef<Path>) -> Result<()> {
        self.core.lock().copy_to(dest.as_ref())
    }

    /// Syncs, then hands the database path to `hook` while the connection is held.
    ///
    /// This is the hook for external backup tools; nothing is executed unless
    /// the caller does so inside `hook`.
    pub fn copy_with<F>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let mut core = self.core.lock();
        if core.store().is_writer() {
            core.sync()?;
        }
        let path = core.path();
        hook(&path)
    }

    pub fn path(&self) -> PathBuf {
        self.core.lock().path()
    }

    /// Number of records.
    ///
    /// Queued `putasync` writes are applied first. If applying them fails they
    /// stay queued and are not counted; the failure is logged and surfaces on
    /// the next call that returns a `Result`.
    pub fn rnum(&self) -> u64 {
        let mut core = self.core.lock();
        apply_queued(&mut core);
        core.rnum()
    }

    /// File size in bytes, with the same treatment of queued writes as [`HashDb::rnum`].
    pub fn fsiz(&self) -> u64 {
        let mut core = self.core.lock();
        apply_queued(&mut core);
        core.fsiz()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Flushes, syncs and releases the file lock.
    pub fn close(self) -> Result<()> {
        self.core.into_inner().close()
    }
}

fn apply_queued(core: &mut HashCore) {
    if let Err(e) = core.flush_async() {
        tracing::warn!(
            path = %core.path().display(),
            error = %e,
            "queued writes not applied, figures exclude them"
        );
    }
}
