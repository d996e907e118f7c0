use bytes::Bytes;

use crate::constants::*;
use crate::error::{Result, ShelfError};
use crate::storage::header::{read_u32, read_u64};

/// 32-byte header at the start of every block in the data region.
///
/// ```text
/// 0  magic     u8   used (0xC8) or free (0xB0)
/// 1  flags     u8   RECORD_FLAG_COMPRESSED
/// 2  pad       u16
/// 4  size      u32  whole block, header included
/// 8  next      u64  next block in the bucket chain, 0 for none
/// 16 key_len   u32
/// 20 val_len   u32  stored (possibly compressed) length
/// 24 crc       u32  CRC32 of key ++ stored value
/// 28 pad       u32
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub magic: u8,
    pub flags: u8,
    pub size: u32,
    pub next: u64,
    pub key_len: u32,
    pub val_len: u32,
    pub crc: u32,
}

impl BlockHeader {
    pub fn free(size: u64) -> Self {
        Self {
            magic: RECORD_MAGIC_FREE,
            flags: 0,
            size: size as u32,
            next: 0,
            key_len: 0,
            val_len: 0,
            crc: 0,
        }
    }

    pub fn is_used(&self) -> bool {
        self.magic == RECORD_MAGIC_USED
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & RECORD_FLAG_COMPRESSED != 0
    }

    /// Bytes of key and stored value following the header.
    pub fn payload_len(&self) -> usize {
        self.key_len as usize + self.val_len as usize
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        buf[0] = self.magic;
        buf[1] = self.flags;
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..16].copy_from_slice(&self.next.to_le_bytes());
        buf[16..20].copy_from_slice(&self.key_len.to_le_bytes());
        buf[20..24].copy_from_slice(&self.val_len.to_le_bytes());
        buf[24..28].copy_from_slice(&self.crc.to_le_bytes());
        buf
    }

    /// Parses a header read from `offset`; anything but a known magic is corrupt.
    pub fn decode(buf: &[u8], offset: u64) -> Result<Self> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Err(ShelfError::RecordHeader { offset });
        }
        let magic = buf[0];
        if magic != RECORD_MAGIC_USED && magic != RECORD_MAGIC_FREE {
            return Err(ShelfError::RecordHeader { offset });
        }
        let header = Self {
            magic,
            flags: buf[1],
            size: read_u32(buf, 4),
            next: read_u64(buf, 8),
            key_len: read_u32(buf, 16),
            val_len: read_u32(buf, 20),
            crc: read_u32(buf, 24),
        };
        if (header.size as usize) < RECORD_HEADER_SIZE
            || (header.is_used()
                && RECORD_HEADER_SIZE + header.payload_len() > header.size as usize)
        {
            return Err(ShelfError::RecordHeader { offset });
        }
        Ok(header)
    }
}

/// A record ready to be placed in a block.
#[derive(Debug, Clone)]
pub struct EncodedRecord {
    pub flags: u8,
    pub key: Vec<u8>,
    pub stored: Vec<u8>,
    pub crc: u32,
}

impl EncodedRecord {
    pub fn new(key: &[u8], value: &[u8], compress: bool) -> Result<Self> {
        if key.len() > MAX_KEY_SIZE {
            return Err(ShelfError::Invalid("key too large"));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(ShelfError::Invalid("value too large"));
        }

        let (flags, stored) = if compress && !value.is_empty() {
            let packed = snap::raw::Encoder::new()
                .compress_vec(value)
                .map_err(|e| ShelfError::Misc(format!("compression failed: {e}")))?;
            (RECORD_FLAG_COMPRESSED, packed)
        } else {
            (0, value.to_vec())
        };

        let crc = checksum(key, &stored);
        Ok(Self {
            flags,
            key: key.to_vec(),
            stored,
            crc,
        })
    }

    /// Header plus payload, before alignment.
    pub fn raw_len(&self) -> u64 {
        (RECORD_HEADER_SIZE + self.key.len() + self.stored.len()) as u64
    }

    pub fn header(&self, size: u64, next: u64) -> BlockHeader {
        BlockHeader {
            magic: RECORD_MAGIC_USED,
            flags: self.flags,
            size: size as u32,
            next,
            key_len: self.key.len() as u32,
            val_len: self.stored.len() as u32,
            crc: self.crc,
        }
    }

    /// Whole block image, zero padded to `size` so the file always covers it.
    pub fn to_block(&self, size: u64, next: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(size as usize);
        buf.extend_from_slice(&self.header(size, next).encode());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.stored);
        buf.resize((size as usize).max(buf.len()), 0);
        buf
    }
}

pub fn checksum(key: &[u8], stored: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    hasher.update(stored);
    hasher.finalize()
}

/// Checks the payload of a used block and returns `(key, value)`.
pub fn decode_payload(header: &BlockHeader, payload: &[u8], offset: u64) -> Result<(Bytes, Bytes)> {
    let key_len = header.key_len as usize;
    if payload.len() < header.payload_len() {
        return Err(ShelfError::RecordHeader { offset });
    }
    let key = &payload[..key_len];
    let stored = &payload[key_len..header.payload_len()];
    if checksum(key, stored) != header.crc {
        return Err(ShelfError::RecordHeader { offset });
    }
    let value = decode_value(header, stored, offset)?;
    Ok((Bytes::copy_from_slice(key), value))
}

pub fn decode_value(header: &BlockHeader, stored: &[u8], offset: u64) -> Result<Bytes> {
    if header.is_compressed() {
        snap::raw::Decoder::new()
            .decompress_vec(stored)
            .map(Bytes::from)
            .map_err(|_| ShelfError::RecordHeader { offset })
    } else {
        Ok(Bytes::copy_from_slice(stored))
    }
}
