use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, ShelfError};
use crate::storage::header::{read_u32, read_u64};

const LEAF_TAG: u8 = b'L';
const INNER_TAG: u8 = b'N';

/// Key under which a node is stored in the underlying hash store.
pub type NodeKey = [u8; 9];

pub fn leaf_key(id: u64) -> NodeKey {
    node_key(LEAF_TAG, id)
}

pub fn inner_key(id: u64) -> NodeKey {
    node_key(INNER_TAG, id)
}

fn node_key(tag: u8, id: u64) -> NodeKey {
    let mut key = [0u8; 9];
    key[0] = tag;
    key[1..].copy_from_slice(&id.to_be_bytes());
    key
}

/// One key of a leaf with its duplicate values in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: Bytes,
    pub values: Vec<Bytes>,
}

impl LeafEntry {
    pub fn new(key: Bytes, values: Vec<Bytes>) -> Self {
        Self { key, values }
    }

    fn encoded_len(&self) -> usize {
        8 + self.key.len() + self.values.iter().map(|v| 4 + v.len()).sum::<usize>()
    }
}

/// Leaf page: ordered entries plus links to its neighbours (0 for none).
#[derive(Debug, Clone)]
pub struct Leaf {
    pub id: u64,
    pub prev: u64,
    pub next: u64,
    pub entries: Vec<LeafEntry>,
    pub dirty: bool,
}

impl Leaf {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            prev: 0,
            next: 0,
            entries: Vec::new(),
            dirty: true,
        }
    }

    /// Serialized size, used for the page size limit.
    pub fn size(&self) -> usize {
        28 + self.entries.iter().map(LeafEntry::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u64_le(self.id);
        buf.put_u64_le(self.prev);
        buf.put_u64_le(self.next);
        buf.put_u32_le(self.entries.len() as u32);
        for entry in &self.entries {
            buf.put_u32_le(entry.key.len() as u32);
            buf.put_slice(&entry.key);
            buf.put_u32_le(entry.values.len() as u32);
            for value in &entry.values {
                buf.put_u32_le(value.len() as u32);
                buf.put_slice(value);
            }
        }
        buf.freeze()
    }

    pub fn decode(raw: &Bytes) -> Result<Self> {
        let mut reader = Reader::new(raw);
        let id = reader.u64()?;
        let prev = reader.u64()?;
        let next = reader.u64()?;
        let count = reader.u32()? as usize;
        let mut entries = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let key = reader.bytes()?;
            let vcount = reader.u32()? as usize;
            let mut values = Vec::with_capacity(vcount.min(4096));
            for _ in 0..vcount {
                values.push(reader.bytes()?);
            }
            entries.push(LeafEntry { key, values });
        }
        reader.finish()?;
        Ok(Self {
            id,
            prev,
            next,
            entries,
            dirty: false,
        })
    }
}

/// Inner page: `children[i]` holds keys below `keys[i]`, `children[i + 1]` keys at or above it.
#[derive(Debug, Clone)]
pub struct Inner {
    pub id: u64,
    pub keys: Vec<Bytes>,
    pub children: Vec<u64>,
    pub dirty: bool,
}

impl Inner {
    pub fn new(id: u64, keys: Vec<Bytes>, children: Vec<u64>) -> Self {
        debug_assert_eq!(children.len(), keys.len() + 1);
        Self {
            id,
            keys,
            children,
            dirty: true,
        }
    }

    pub fn encode(&self) -> Bytes {
        let size = 20 + self.keys.iter().map(|k| 12 + k.len()).sum::<usize>();
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u64_le(self.id);
        buf.put_u32_le(self.keys.len() as u32);
        buf.put_u64_le(self.children[0]);
        for (key, child) in self.keys.iter().zip(&self.children[1..]) {
            buf.put_u32_le(key.len() as u32);
            buf.put_slice(key);
            buf.put_u64_le(*child);
        }
        buf.freeze()
    }

    pub fn decode(raw: &Bytes) -> Result<Self> {
        let mut reader = Reader::new(raw);
        let id = reader.u64()?;
        let count = reader.u32()? as usize;
        let mut keys = Vec::with_capacity(count.min(4096));
        let mut children = Vec::with_capacity(count.min(4096) + 1);
        children.push(reader.u64()?);
        for _ in 0..count {
            keys.push(reader.bytes()?);
            children.push(reader.u64()?);
        }
        reader.finish()?;
        Ok(Self {
            id,
            keys,
            children,
            dirty: false,
        })
    }
}

struct Reader<'a> {
    raw: &'a Bytes,
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(raw: &'a Bytes) -> Self {
        Self { raw, at: 0 }
    }

    fn take(&mut self, len: usize) -> Result<usize> {
        if self.raw.len() - self.at < len {
            return Err(ShelfError::Meta("truncated tree node"));
        }
        let start = self.at;
        self.at += len;
        Ok(start)
    }

    fn u32(&mut self) -> Result<u32> {
        let at = self.take(4)?;
        Ok(read_u32(self.raw, at))
    }

    fn u64(&mut self) -> Result<u64> {
        let at = self.take(8)?;
        Ok(read_u64(self.raw, at))
    }

    fn bytes(&mut self) -> Result<Bytes> {
        let len = self.u32()? as usize;
        let at = self.take(len)?;
        Ok(self.raw.slice(at..at + len))
    }

    fn finish(self) -> Result<()> {
        if self.at == self.raw.len() {
            Ok(())
        } else {
            Err(ShelfError::Meta("trailing bytes in tree node"))
        }
    }
}
