use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use crate::core::options::{FixedTuning, OpenMode};
use crate::error::Result;
use crate::stats::Statistics;

use super::{FixedCore, FixedDb};

/// Collects slot geometry for a [`FixedDb`]; an existing file keeps its own.
#[derive(Debug, Clone, Default)]
pub struct FixedDbBuilder {
    tuning: FixedTuning,
}

impl FixedDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tune(mut self, tuning: FixedTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Bytes per value. 0 selects the default of 255.
    pub fn width(mut self, width: u32) -> Self {
        self.tuning.width = width;
        self
    }

    /// Ceiling on the file size. 0 selects the default of 256 MiB.
    pub fn limsiz(mut self, limsiz: u64) -> Self {
        self.tuning.limsiz = limsiz;
        self
    }

    pub fn open(self, path: impl AsRef<Path>, mode: OpenMode) -> Result<FixedDb> {
        let stats = Arc::new(Statistics::new());
        let core = FixedCore::open(path.as_ref(), mode, self.tuning, stats.clone())?;
        Ok(FixedDb {
            core: Mutex::new(core),
            stats,
        })
    }
}
