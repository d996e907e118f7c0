use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::sync::Arc;

use crate::constants::*;
use crate::core::options::{BTreeTuning, OpenMode, TuningOptions};
use crate::error::Result;
use crate::stats::Statistics;

use super::{BTreeDb, Comparator, TreeCore};

/// Collects tuning, cache and comparator settings for a [`BTreeDb`].
///
/// # Example
///
/// ```no_run
/// use shelfdb::{BTreeDb, Comparator, OpenMode};
///
/// # fn main() -> shelfdb::Result<()> {
/// let db = BTreeDb::builder()
///     .lmemb(64)
///     .nmemb(128)
///     .cache(2048, 1024)
///     .comparator(Comparator::Decimal)
///     .open("scores.sbt", OpenMode::create())?;
/// db.put(b"10", b"ten")?;
/// db.put(b"9", b"nine")?;
/// assert_eq!(db.range(None, None, Some(1))?[0].as_ref(), b"9");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BTreeDbBuilder {
    tuning: BTreeTuning,
    lcnum: usize,
    ncnum: usize,
    cmp: Comparator,
}

impl BTreeDbBuilder {
    pub fn new() -> Self {
        Self {
            tuning: BTreeTuning::default(),
            lcnum: DEFAULT_LCNUM,
            ncnum: DEFAULT_NCNUM,
            cmp: Comparator::default(),
        }
    }

    pub fn tune(mut self, tuning: BTreeTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Maximum entries per leaf. 0 selects the default of 128.
    pub fn lmemb(mut self, lmemb: usize) -> Self {
        self.tuning.lmemb = lmemb;
        self
    }

    /// Maximum keys per inner node. 0 selects the default of 256.
    pub fn nmemb(mut self, nmemb: usize) -> Self {
        self.tuning.nmemb = nmemb;
        self
    }

    pub fn bnum(mut self, bnum: u64) -> Self {
        self.tuning.bnum = bnum;
        self
    }

    pub fn apow(mut self, apow: u8) -> Self {
        self.tuning.apow = apow;
        self
    }

    pub fn fpow(mut self, fpow: u8) -> Self {
        self.tuning.fpow = fpow;
        self
    }

    pub fn options(mut self, opts: TuningOptions) -> Self {
        self.tuning.opts = opts;
        self
    }

    /// Resident leaf and inner node limits. 0 selects the defaults.
    pub fn cache(mut self, lcnum: usize, ncnum: usize) -> Self {
        self.lcnum = if lcnum == 0 { DEFAULT_LCNUM } else { lcnum };
        self.ncnum = if ncnum == 0 { DEFAULT_NCNUM } else { ncnum };
        self
    }

    /// Key ordering. A file created with a custom comparator must be reopened
    /// with a comparator of the same name.
    pub fn comparator(mut self, cmp: Comparator) -> Self {
        self.cmp = cmp;
        self
    }

    pub fn open(self, path: impl AsRef<Path>, mode: OpenMode) -> Result<BTreeDb> {
        let stats = Arc::new(Statistics::new());
        let core = TreeCore::open(
            path.as_ref(),
            mode,
            self.tuning,
            self.cmp,
            (self.lcnum, self.ncnum),
            stats.clone(),
        )?;
        Ok(BTreeDb {
            core: Mutex::new(core),
            tran_cv: Condvar::new(),
            stats,
        })
    }
}

impl Default for BTreeDbBuilder {
    fn default() -> Self {
        Self::new()
    }
}
