use crate::constants::*;
use crate::core::options::{HashTuning, TuningOptions};
use crate::error::{Result, ShelfError};

/// Fixed-size header at offset 0 of hash and B-tree files.
///
/// Layout (little-endian):
/// `magic[8] version kind apow fpow opts flags pad[2] bnum rnum fsiz`
/// followed at [`OPAQUE_OFFSET`] by an engine-owned opaque region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub kind: EngineKind,
    pub apow: u8,
    pub fpow: u8,
    pub opts: u8,
    pub flags: u8,
    pub bnum: u64,
    pub rnum: u64,
    pub fsiz: u64,
    pub opaque: [u8; OPAQUE_SIZE],
}

impl FileHeader {
    pub fn new(kind: EngineKind, tuning: &HashTuning) -> Self {
        let mut header = Self {
            kind,
            apow: tuning.apow,
            fpow: tuning.fpow,
            opts: tuning.opts.to_bits(),
            flags: 0,
            bnum: tuning.bnum,
            rnum: 0,
            fsiz: 0,
            opaque: [0; OPAQUE_SIZE],
        };
        header.fsiz = header.data_start();
        header
    }

    pub fn tuning(&self) -> HashTuning {
        HashTuning {
            bnum: self.bnum,
            apow: self.apow,
            fpow: self.fpow,
            opts: TuningOptions::from_bits(self.opts),
        }
    }

    pub fn align(&self) -> u64 {
        1u64 << self.apow
    }

    pub fn pool_capacity(&self) -> usize {
        1usize << self.fpow
    }

    pub fn bucket_offset(&self) -> u64 {
        FILE_HEADER_SIZE as u64
    }

    pub fn pool_offset(&self) -> u64 {
        self.bucket_offset() + self.bnum * 8
    }

    /// First byte of the record region.
    pub fn data_start(&self) -> u64 {
        let end = self.pool_offset() + (self.pool_capacity() * POOL_ENTRY_SIZE) as u64;
        align_up(end, self.align())
    }

    pub fn is_dirty(&self) -> bool {
        self.flags & HEADER_FLAG_DIRTY != 0
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        if dirty {
            self.flags |= HEADER_FLAG_DIRTY;
        } else {
            self.flags &= !HEADER_FLAG_DIRTY;
        }
    }

    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..8].copy_from_slice(SHELF_SIGNATURE);
        buf[8] = SHELF_FORMAT_VERSION;
        buf[9] = self.kind.as_u8();
        buf[10] = self.apow;
        buf[11] = self.fpow;
        buf[12] = self.opts;
        buf[13] = self.flags;
        buf[16..24].copy_from_slice(&self.bnum.to_le_bytes());
        buf[24..32].copy_from_slice(&self.rnum.to_le_bytes());
        buf[32..40].copy_from_slice(&self.fsiz.to_le_bytes());
        buf[OPAQUE_OFFSET..OPAQUE_OFFSET + OPAQUE_SIZE].copy_from_slice(&self.opaque);
        buf
    }

    /// Bytes `[13..40)`: flags and the counters rewritten after each mutation.
    pub fn dynamic_bytes(&self) -> (u64, [u8; 27]) {
        let full = self.encode();
        let mut out = [0u8; 27];
        out.copy_from_slice(&full[13..40]);
        (13, out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FILE_HEADER_SIZE {
            return Err(ShelfError::Meta("file is shorter than its header"));
        }
        if &buf[0..8] != SHELF_SIGNATURE {
            return Err(ShelfError::Meta("bad file signature"));
        }
        if buf[8] != SHELF_FORMAT_VERSION {
            return Err(ShelfError::Meta("unsupported format version"));
        }
        let kind = EngineKind::from_u8(buf[9]).ok_or(ShelfError::Meta("unknown engine kind"))?;
        let apow = buf[10];
        let fpow = buf[11];
        if apow > MAX_APOW || fpow > MAX_FPOW {
            return Err(ShelfError::Meta("alignment or pool power out of range"));
        }
        let bnum = read_u64(buf, 16);
        if bnum == 0 {
            return Err(ShelfError::Meta("bucket count is zero"));
        }

        let mut opaque = [0u8; OPAQUE_SIZE];
        opaque.copy_from_slice(&buf[OPAQUE_OFFSET..OPAQUE_OFFSET + OPAQUE_SIZE]);

        Ok(Self {
            kind,
            apow,
            fpow,
            opts: buf[12],
            flags: buf[13],
            bnum,
            rnum: read_u64(buf, 24),
            fsiz: read_u64(buf, 32),
            opaque,
        })
    }
}

pub fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

pub(crate) fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}
