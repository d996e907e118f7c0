// Size units
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

// Size limits
pub const MAX_KEY_SIZE: usize = 64 * MB;
pub const MAX_VALUE_SIZE: usize = 256 * MB;

// File header (shared by hash and B-tree files)
pub const SHELF_SIGNATURE: &[u8; 8] = b"SHELFDB\0";
pub const SHELF_FORMAT_VERSION: u8 = 1;
pub const FILE_HEADER_SIZE: usize = 256;
pub const OPAQUE_OFFSET: usize = 64;
pub const OPAQUE_SIZE: usize = 128;

// Fixed-length files carry their own signature
pub const FIXED_SIGNATURE: &[u8; 8] = b"SHELFFIX";
pub const FIXED_HEADER_SIZE: usize = 256;

// Hash engine defaults
pub const DEFAULT_BNUM: u64 = 16381;
pub const DEFAULT_APOW: u8 = 4;
pub const DEFAULT_FPOW: u8 = 10;
pub const MAX_APOW: u8 = 16;
pub const MAX_FPOW: u8 = 20;
pub const DEFAULT_RCNUM: usize = 0;

// B-tree defaults
pub const DEFAULT_LMEMB: usize = 128;
pub const DEFAULT_NMEMB: usize = 256;
pub const MIN_LMEMB: usize = 4;
pub const MIN_NMEMB: usize = 4;
pub const DEFAULT_LCNUM: usize = 1024;
pub const DEFAULT_NCNUM: usize = 512;
pub const MIN_NODE_CACHE: usize = 8;
pub const LEAF_SIZE_MAX: usize = 64 * KB;

// Fixed-length defaults
pub const DEFAULT_WIDTH: u32 = 255;
pub const DEFAULT_LIMSIZ: u64 = 256 * MB as u64;
pub const FIXED_SLOT_OVERHEAD: usize = 5;

// Record block layout
pub const RECORD_HEADER_SIZE: usize = 32;
pub const RECORD_MAGIC_USED: u8 = 0xC8;
pub const RECORD_MAGIC_FREE: u8 = 0xB0;
pub const RECORD_FLAG_COMPRESSED: u8 = 0x01;
pub const POOL_ENTRY_SIZE: usize = 16;

// Header flag bits
pub const HEADER_FLAG_DIRTY: u8 = 0x01;

// Tuning option bits
pub const OPT_LARGE: u8 = 0x01;
pub const OPT_COMPRESS: u8 = 0x02;

// File size ceiling when the large option is off
pub const SMALL_FILE_LIMIT: u64 = i32::MAX as u64;

// Bytes read speculatively with a block header so short keys need one read
pub const BLOCK_PREFETCH: usize = 256;

// Write buffer configuration (putasync)
pub const ASYNC_BUFFER_ENTRIES: usize = 1024;
pub const ASYNC_BUFFER_BYTES: usize = 4 * MB;

// Engine kinds stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Hash,
    BTree,
    Fixed,
}

impl EngineKind {
    pub fn as_u8(self) -> u8 {
        match self {
            EngineKind::Hash => 1,
            EngineKind::BTree => 2,
            EngineKind::Fixed => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EngineKind::Hash),
            2 => Some(EngineKind::BTree),
            3 => Some(EngineKind::Fixed),
            _ => None,
        }
    }
}

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
