use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use crate::constants::*;
use crate::core::options::{HashTuning, OpenMode, TuningOptions};
use crate::error::Result;
use crate::stats::Statistics;

use super::{HashCore, HashDb};

/// Collects tuning and cache settings for a [`HashDb`].
///
/// Tuning only affects files created by `open`; an existing file keeps the
/// layout it was created with.
///
/// # Example
///
/// ```no_run
/// use shelfdb::{Compression, HashDb, OpenMode, TuningOptions};
///
/// # fn main() -> shelfdb::Result<()> {
/// let db = HashDb::builder()
///     .bnum(131_071)
///     .apow(4)
///     .fpow(10)
///     .options(TuningOptions { large: false, compress: Compression::Snappy })
///     .cache(10_000)
///     .open("casket.shh", OpenMode::create())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HashDbBuilder {
    tuning: HashTuning,
    rcnum: usize,
}

impl HashDbBuilder {
    pub fn new() -> Self {
        Self {
            tuning: HashTuning::default(),
            rcnum: DEFAULT_RCNUM,
        }
    }

    /// Replaces every tuning value at once.
    pub fn tune(mut self, tuning: HashTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Number of buckets. 0 selects the default of 16381.
    pub fn bnum(mut self, bnum: u64) -> Self {
        self.tuning.bnum = bnum;
        self
    }

    /// Record alignment as a power of two. Default: 4 (16 bytes).
    pub fn apow(mut self, apow: u8) -> Self {
        self.tuning.apow = apow;
        self
    }

    /// Free block pool capacity as a power of two. Default: 10 (1024 entries).
    pub fn fpow(mut self, fpow: u8) -> Self {
        self.tuning.fpow = fpow;
        self
    }

    pub fn options(mut self, opts: TuningOptions) -> Self {
        self.tuning.opts = opts;
        self
    }

    /// Maximum number of records kept in the record cache. 0 disables it.
    pub fn cache(mut self, rcnum: usize) -> Self {
        self.rcnum = rcnum;
        self
    }

    pub fn open(self, path: impl AsRef<Path>, mode: OpenMode) -> Result<HashDb> {
        let stats = Arc::new(Statistics::new());
        let core = HashCore::open(
            path.as_ref(),
            mode,
            EngineKind::Hash,
            self.tuning.normalized(),
            self.rcnum,
            stats.clone(),
        )?;
        Ok(HashDb {
            core: Mutex::new(core),
            stats,
        })
    }
}

impl Default for HashDbBuilder {
    fn default() -> Self {
        Self::new()
    }
}
