use crate::constants::OPAQUE_SIZE;
use crate::error::{Result, ShelfError};
use crate::storage::header::{read_u32, read_u64};

use super::comparator::MAX_COMPARATOR_NAME;

/// Tree metadata kept in the opaque region of the file header.
///
/// ```text
/// 0  cmp tag   u8      41 rnum     u64
/// 1  lmemb     u32     49 depth    u32
/// 5  nmemb     u32     53 name len u8
/// 9  root      u64     54 name     [u8; 63]
/// 17 first     u64
/// 25 last      u64
/// 33 next id   u64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeMeta {
    pub cmp_tag: u8,
    pub lmemb: u32,
    pub nmemb: u32,
    pub root: u64,
    pub first: u64,
    pub last: u64,
    pub next_id: u64,
    /// Stored values, duplicates included.
    pub rnum: u64,
    /// Levels from root to leaves; 1 when the root is a leaf.
    pub depth: u32,
    pub cmp_name: String,
}

impl TreeMeta {
    /// True for a file whose tree has not been laid out yet.
    pub fn is_blank(&self) -> bool {
        self.root == 0
    }

    pub fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn encode(&self) -> [u8; OPAQUE_SIZE] {
        let mut buf = [0u8; OPAQUE_SIZE];
        buf[0] = self.cmp_tag;
        buf[1..5].copy_from_slice(&self.lmemb.to_le_bytes());
        buf[5..9].copy_from_slice(&self.nmemb.to_le_bytes());
        buf[9..17].copy_from_slice(&self.root.to_le_bytes());
        buf[17..25].copy_from_slice(&self.first.to_le_bytes());
        buf[25..33].copy_from_slice(&self.last.to_le_bytes());
        buf[33..41].copy_from_slice(&self.next_id.to_le_bytes());
        buf[41..49].copy_from_slice(&self.rnum.to_le_bytes());
        buf[49..53].copy_from_slice(&self.depth.to_le_bytes());
        let name = self.cmp_name.as_bytes();
        let len = name.len().min(MAX_COMPARATOR_NAME);
        buf[53] = len as u8;
        buf[54..54 + len].copy_from_slice(&name[..len]);
        buf
    }

    pub fn decode(buf: &[u8; OPAQUE_SIZE]) -> Result<Self> {
        let len = buf[53] as usize;
        if len > MAX_COMPARATOR_NAME {
            return Err(ShelfError::Meta("comparator name too long"));
        }
        let cmp_name = std::str::from_utf8(&buf[54..54 + len])
            .map_err(|_| ShelfError::Meta("comparator name is not UTF-8"))?
            .to_string();
        let meta = Self {
            cmp_tag: buf[0],
            lmemb: read_u32(buf, 1),
            nmemb: read_u32(buf, 5),
            root: read_u64(buf, 9),
            first: read_u64(buf, 17),
            last: read_u64(buf, 25),
            next_id: read_u64(buf, 33),
            rnum: read_u64(buf, 41),
            depth: read_u32(buf, 49),
            cmp_name,
        };
        if !meta.is_blank() && (meta.depth == 0 || meta.first == 0 || meta.last == 0) {
            return Err(ShelfError::Meta("inconsistent tree metadata"));
        }
        Ok(meta)
    }
}
