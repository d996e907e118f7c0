use crate::constants::*;
use crate::error::{Result, ShelfError};

/// Whether the connection may mutate the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Reader,
    Writer,
}

/// What `open` does when the file is missing or already populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePolicy {
    MustExist,
    CreateIfAbsent,
    Truncate,
}

/// How the file-scoped lock is taken at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPolicy {
    Blocking,
    NonBlocking,
    NoLock,
}

/// Connection mode passed to `open`.
///
/// ```rust
/// use shelfdb::{LockPolicy, OpenMode};
///
/// let mode = OpenMode::create().with_lock(LockPolicy::NonBlocking);
/// assert!(mode.is_writer());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub access: Access,
    pub create: CreatePolicy,
    pub lock: LockPolicy,
}

impl OpenMode {
    /// Read-only connection on an existing file.
    pub fn reader() -> Self {
        Self {
            access: Access::Reader,
            create: CreatePolicy::MustExist,
            lock: LockPolicy::Blocking,
        }
    }

    /// Writer on an existing file.
    pub fn writer() -> Self {
        Self {
            access: Access::Writer,
            create: CreatePolicy::MustExist,
            lock: LockPolicy::Blocking,
        }
    }

    /// Writer that creates the file when it does not exist.
    pub fn create() -> Self {
        Self {
            create: CreatePolicy::CreateIfAbsent,
            ..Self::writer()
        }
    }

    /// Writer that always starts from an empty file.
    pub fn truncate() -> Self {
        Self {
            create: CreatePolicy::Truncate,
            ..Self::writer()
        }
    }

    pub fn with_lock(mut self, lock: LockPolicy) -> Self {
        self.lock = lock;
        self
    }

    pub fn is_writer(&self) -> bool {
        self.access == Access::Writer
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.access == Access::Reader && self.create != CreatePolicy::MustExist {
            return Err(ShelfError::Invalid("a reader cannot create or truncate"));
        }
        Ok(())
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::reader()
    }
}

/// Value compression for stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Snappy,
}

/// Layout options persisted in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TuningOptions {
    /// Allows files beyond 2GB. Offsets are always 64-bit; the bit is kept in the header.
    pub large: bool,
    pub compress: Compression,
}

impl TuningOptions {
    pub fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.large {
            bits |= OPT_LARGE;
        }
        if self.compress == Compression::Snappy {
            bits |= OPT_COMPRESS;
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            large: bits & OPT_LARGE != 0,
            compress: if bits & OPT_COMPRESS != 0 {
                Compression::Snappy
            } else {
                Compression::None
            },
        }
    }
}

/// Tuning of the hash layout. Fixed once the file is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashTuning {
    /// Number of buckets.
    pub bnum: u64,
    /// Record alignment as a power of two.
    pub apow: u8,
    /// Free block pool capacity as a power of two.
    pub fpow: u8,
    pub opts: TuningOptions,
}

impl Default for HashTuning {
    fn default() -> Self {
        Self {
            bnum: DEFAULT_BNUM,
            apow: DEFAULT_APOW,
            fpow: DEFAULT_FPOW,
            opts: TuningOptions::default(),
        }
    }
}

impl HashTuning {
    pub(crate) fn normalized(mut self) -> Self {
        if self.bnum == 0 {
            self.bnum = DEFAULT_BNUM;
        }
        self.apow = self.apow.min(MAX_APOW);
        self.fpow = self.fpow.min(MAX_FPOW);
        self
    }
}

/// Partial tuning for `optimize`; `None` keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashRetune {
    pub bnum: Option<u64>,
    pub apow: Option<u8>,
    pub fpow: Option<u8>,
    pub opts: Option<TuningOptions>,
}

/// Tuning of the B-tree layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeTuning {
    /// Maximum entries per leaf.
    pub lmemb: usize,
    /// Maximum separator keys per inner node.
    pub nmemb: usize,
    pub bnum: u64,
    pub apow: u8,
    pub fpow: u8,
    pub opts: TuningOptions,
}

impl Default for BTreeTuning {
    fn default() -> Self {
        Self {
            lmemb: DEFAULT_LMEMB,
            nmemb: DEFAULT_NMEMB,
            bnum: DEFAULT_BNUM,
            apow: DEFAULT_APOW,
            fpow: DEFAULT_FPOW,
            opts: TuningOptions::default(),
        }
    }
}

impl BTreeTuning {
    pub(crate) fn normalized(mut self) -> Self {
        if self.lmemb == 0 {
            self.lmemb = DEFAULT_LMEMB;
        }
        if self.nmemb == 0 {
            self.nmemb = DEFAULT_NMEMB;
        }
        self.lmemb = self.lmemb.max(MIN_LMEMB);
        self.nmemb = self.nmemb.max(MIN_NMEMB);
        self
    }

    pub(crate) fn hash_tuning(&self) -> HashTuning {
        HashTuning {
            bnum: self.bnum,
            apow: self.apow,
            fpow: self.fpow,
            opts: self.opts,
        }
        .normalized()
    }
}

/// Partial tuning for B-tree `optimize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BTreeRetune {
    pub lmemb: Option<usize>,
    pub nmemb: Option<usize>,
    pub bnum: Option<u64>,
    pub apow: Option<u8>,
    pub fpow: Option<u8>,
    pub opts: Option<TuningOptions>,
}

/// Tuning of the fixed-length layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTuning {
    /// Payload bytes per slot.
    pub width: u32,
    /// Ceiling on the file size.
    pub limsiz: u64,
}

impl Default for FixedTuning {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            limsiz: DEFAULT_LIMSIZ,
        }
    }
}

impl FixedTuning {
    pub(crate) fn normalized(mut self) -> Self {
        if self.width == 0 {
            self.width = DEFAULT_WIDTH;
        }
        if self.limsiz == 0 {
            self.limsiz = DEFAULT_LIMSIZ;
        }
        self
    }
}
