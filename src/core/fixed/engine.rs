use bytes::Bytes;
use roaring::RoaringTreemap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::*;
use crate::core::hash::PutMode;
use crate::core::options::{CreatePolicy, FixedTuning, LockPolicy, OpenMode};
use crate::error::{IoOp, Result, ShelfError};
use crate::stats::Statistics;
use crate::storage::block_store::{open_file, replace_file, temp_path};
use crate::storage::header::{read_u32, read_u64};
use crate::storage::io::DiskIO;
use crate::storage::lock::FileLock;

use super::interval::{Endpoint, IdInterval};

const SLOT_USED: u8 = 1;
/// Slots read per chunk while rebuilding the id set.
const SCAN_CHUNK_SLOTS: usize = 4096;

/// Address of a fixed-length record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedKey {
    Id(u64),
    /// Smallest live id.
    Min,
    /// One below the smallest live id.
    Prev,
    /// Largest live id.
    Max,
    /// One above the largest live id; 1 in an empty database.
    Next,
}

impl FixedKey {
    /// Reads a textual key: a decimal id or one of `min`, `prev`, `max`, `next`.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| ShelfError::Invalid("fixed-length key is not text"))?
            .trim();
        match text.to_ascii_lowercase().as_str() {
            "min" => Ok(FixedKey::Min),
            "prev" => Ok(FixedKey::Prev),
            "max" => Ok(FixedKey::Max),
            "next" => Ok(FixedKey::Next),
            _ => text
                .parse::<u64>()
                .map(FixedKey::Id)
                .map_err(|_| ShelfError::Invalid("fixed-length key is not an id")),
        }
    }
}

impl From<u64> for FixedKey {
    fn from(id: u64) -> Self {
        FixedKey::Id(id)
    }
}

/// Header of a fixed-length file.
///
/// ```text
/// 0  magic "SHELFFIX"   24 limsiz u64
/// 8  version u8         32 rnum   u64
/// 9  flags u8           40 fsiz   u64
/// 16 width u32
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub flags: u8,
    pub width: u32,
    pub limsiz: u64,
    pub rnum: u64,
    pub fsiz: u64,
}

impl FixedHeader {
    fn new(tuning: FixedTuning) -> Self {
        Self {
            flags: 0,
            width: tuning.width,
            limsiz: tuning.limsiz,
            rnum: 0,
            fsiz: FIXED_HEADER_SIZE as u64,
        }
    }

    pub fn slot_size(&self) -> u64 {
        (FIXED_SLOT_OVERHEAD + self.width as usize) as u64
    }

    /// Largest id whose slot fits under the size ceiling.
    pub fn limit(&self) -> u64 {
        self.limsiz.saturating_sub(FIXED_HEADER_SIZE as u64) / self.slot_size()
    }

    pub fn slot_offset(&self, id: u64) -> u64 {
        FIXED_HEADER_SIZE as u64 + (id - 1) * self.slot_size()
    }

    fn is_dirty(&self) -> bool {
        self.flags & HEADER_FLAG_DIRTY != 0
    }

    fn encode(&self) -> [u8; FIXED_HEADER_SIZE] {
        let mut buf = [0u8; FIXED_HEADER_SIZE];
        buf[0..8].copy_from_slice(FIXED_SIGNATURE);
        buf[8] = SHELF_FORMAT_VERSION;
        buf[9] = self.flags;
        buf[16..20].copy_from_slice(&self.width.to_le_bytes());
        buf[24..32].copy_from_slice(&self.limsiz.to_le_bytes());
        buf[32..40].copy_from_slice(&self.rnum.to_le_bytes());
        buf[40..48].copy_from_slice(&self.fsiz.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_SIZE || &buf[0..8] != FIXED_SIGNATURE {
            return Err(ShelfError::Meta("not a fixed-length database"));
        }
        if buf[8] != SHELF_FORMAT_VERSION {
            return Err(ShelfError::Meta("unsupported format version"));
        }
        let header = Self {
            flags: buf[9],
            width: read_u32(buf, 16),
            limsiz: read_u64(buf, 24),
            rnum: read_u64(buf, 32),
            fsiz: read_u64(buf, 40),
        };
        if header.width == 0 || header.limit() == 0 {
            return Err(ShelfError::Meta("fixed-length geometry is invalid"));
        }
        Ok(header)
    }
}

/// Array of equal-width slots addressed by id. Not synchronized.
pub struct FixedCore {
    path: PathBuf,
    io: DiskIO,
    header: FixedHeader,
    ids: RoaringTreemap,
    /// Snapshot of live ids for `iter_next` and the position in it.
    iter: Option<(Vec<u64>, usize)>,
    mode: OpenMode,
    writer: bool,
    closed: bool,
    lock: Option<FileLock>,
    stats: Arc<Statistics>,
}

impl FixedCore {
    pub fn open(
        path: &Path,
        mode: OpenMode,
        tuning: FixedTuning,
        stats: Arc<Statistics>,
    ) -> Result<Self> {
        mode.validate()?;
        let file = open_file(path, &mode)?;
        let lock = FileLock::acquire(&file, path, mode.is_writer(), mode.lock)?;
        let io = DiskIO::new(file, stats.clone());
        if mode.create == CreatePolicy::Truncate {
            io.set_len(0)?;
        }

        let len = io.file_len()?;
        let fresh = len == 0;
        let header = if fresh {
            if !mode.is_writer() {
                return Err(ShelfError::Meta("database file is empty"));
            }
            let header = FixedHeader::new(tuning.normalized());
            if header.limit() == 0 {
                return Err(ShelfError::Invalid("size limit leaves no room for a slot"));
            }
            io.write_at(0, &header.encode())?;
            io.flush()?;
            header
        } else {
            FixedHeader::decode(&io.read_at(0, FIXED_HEADER_SIZE.min(len as usize))?)?
        };

        let mut core = Self {
            path: path.to_path_buf(),
            io,
            header,
            ids: RoaringTreemap::new(),
            iter: None,
            mode,
            writer: mode.is_writer(),
            closed: false,
            lock: Some(lock),
            stats,
        };
        if !fresh {
            core.load_ids(len)?;
        }
        tracing::debug!(
            path = %path.display(),
            width = core.header.width,
            rnum = core.header.rnum,
            "opened fixed-length database"
        );
        Ok(core)
    }

    /// Rebuilds the live id set by scanning every written slot.
    fn load_ids(&mut self, file_len: u64) -> Result<()> {
        let slot = self.header.slot_size();
        let data_len = file_len.saturating_sub(FIXED_HEADER_SIZE as u64);
        // A partial tail slot still counts as written
        let written = data_len.div_ceil(slot);
        let mut id = 1;
        while id <= written {
            let count = (written - id + 1).min(SCAN_CHUNK_SLOTS as u64);
            let offset = self.header.slot_offset(id);
            let available = (file_len - offset).min(count * slot);
            let mut raw = self.io.read_at(offset, available as usize)?;
            raw.resize((count * slot) as usize, 0);
            for chunk in raw.chunks_exact(slot as usize) {
                if chunk[0] == SLOT_USED {
                    self.ids.insert(id);
                }
                id += 1;
            }
        }

        if self.writer && data_len % slot != 0 {
            let full = FIXED_HEADER_SIZE as u64 + written * slot;
            self.io.set_len(full)?;
            self.header.fsiz = self.header.fsiz.max(full);
        }

        if self.writer && self.header.is_dirty() {
            tracing::warn!(
                path = %self.path.display(),
                "database was not closed cleanly, recounting records"
            );
            self.header.fsiz = FIXED_HEADER_SIZE as u64 + written * slot;
            self.header.rnum = self.ids.len();
            self.sync()?;
        }
        self.header.rnum = self.ids.len();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FixedHeader {
        &self.header
    }

    pub fn stats(&self) -> &Arc<Statistics> {
        &self.stats
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn limit(&self) -> u64 {
        self.header.limit()
    }

    pub fn rnum(&self) -> u64 {
        self.ids.len()
    }

    pub fn fsiz(&self) -> u64 {
        self.header.fsiz
    }

    pub fn min_id(&self) -> Option<u64> {
        self.ids.min()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.ids.max()
    }

    pub fn is_writer(&self) -> bool {
        self.writer
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ShelfError::Invalid("connection closed after failed optimize"));
        }
        Ok(())
    }

    fn ensure_writer(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.writer {
            return Err(ShelfError::Invalid("connection is read-only"));
        }
        Ok(())
    }

    fn check_id(&self, id: u64) -> Result<u64> {
        if id == 0 || id > self.header.limit() {
            return Err(ShelfError::Invalid("id out of range"));
        }
        Ok(id)
    }

    /// Concrete id of `key`, `None` when it names a record that does not exist.
    pub fn resolve(&self, key: FixedKey) -> Result<Option<u64>> {
        let id = match key {
            FixedKey::Id(id) => Some(id),
            FixedKey::Min => self.ids.min(),
            FixedKey::Max => self.ids.max(),
            FixedKey::Prev => self.ids.min().map(|min| min - 1),
            FixedKey::Next => Some(self.ids.max().map_or(1, |max| max + 1)),
        };
        id.map(|id| self.check_id(id)).transpose()
    }

    fn resolve_for_write(&self, key: FixedKey) -> Result<u64> {
        self.resolve(key)?
            .ok_or(ShelfError::Invalid("relative id needs at least one record"))
    }

    fn read_slot(&self, id: u64) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        if !self.ids.contains(id) {
            return Ok(None);
        }
        let raw = self
            .io
            .read_at(self.header.slot_offset(id), self.header.slot_size() as usize)?;
        if raw[0] != SLOT_USED {
            return Err(ShelfError::RecordHeader {
                offset: self.header.slot_offset(id),
            });
        }
        let len = read_u32(&raw, 1) as usize;
        if len > self.header.width as usize {
            return Err(ShelfError::RecordHeader {
                offset: self.header.slot_offset(id),
            });
        }
        Ok(Some(Bytes::copy_from_slice(
            &raw[FIXED_SLOT_OVERHEAD..FIXED_SLOT_OVERHEAD + len],
        )))
    }

    fn begin_mutation(&mut self) -> Result<()> {
        self.ensure_writer()?;
        if !self.header.is_dirty() {
            self.header.flags |= HEADER_FLAG_DIRTY;
            self.write_header()?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        self.io.write_at(0, &self.header.encode())
    }

    pub fn put(&mut self, key: FixedKey, value: &[u8], mode: PutMode) -> Result<bool> {
        self.stats.record_put();
        let id = self.resolve_for_write(key)?;
        let joined;
        let value = match (self.read_slot(id)?, mode) {
            (Some(_), PutMode::Keep) => return Ok(false),
            (Some(old), PutMode::Concat) => {
                let mut buf = old.to_vec();
                buf.extend_from_slice(value);
                joined = buf;
                &joined[..]
            }
            _ => value,
        };
        if value.len() > self.header.width as usize {
            return Err(ShelfError::Invalid("value is wider than the slot"));
        }

        self.begin_mutation()?;
        // Whole slot so the file always ends on a slot boundary
        let mut slot = vec![0u8; self.header.slot_size() as usize];
        slot[0] = SLOT_USED;
        slot[1..FIXED_SLOT_OVERHEAD].copy_from_slice(&(value.len() as u32).to_le_bytes());
        slot[FIXED_SLOT_OVERHEAD..FIXED_SLOT_OVERHEAD + value.len()].copy_from_slice(value);
        let offset = self.header.slot_offset(id);
        self.io.write_at(offset, &slot)?;

        self.ids.insert(id);
        self.header.rnum = self.ids.len();
        self.header.fsiz = self.header.fsiz.max(offset + self.header.slot_size());
        self.write_header()?;
        Ok(true)
    }

    /// Clears the slot of `key`; returns whether a record was there.
    pub fn remove(&mut self, key: FixedKey) -> Result<bool> {
        self.stats.record_delete();
        let id = match self.resolve(key)? {
            Some(id) if self.ids.contains(id) => id,
            _ => return Ok(false),
        };
        self.begin_mutation()?;
        self.io.write_at(self.header.slot_offset(id), &[0u8; FIXED_SLOT_OVERHEAD])?;
        self.ids.remove(id);
        self.header.rnum = self.ids.len();
        self.write_header()?;
        Ok(true)
    }

    pub fn get(&mut self, key: FixedKey) -> Result<Option<Bytes>> {
        self.stats.record_get();
        match self.resolve(key)? {
            Some(id) => self.read_slot(id),
            None => Ok(None),
        }
    }

    pub fn vsiz(&mut self, key: FixedKey) -> Result<Option<usize>> {
        Ok(self.get(key)?.map(|v| v.len()))
    }

    pub fn iter_init(&mut self) {
        self.iter = Some((self.ids.iter().collect(), 0));
    }

    /// Next live id of the iterator in ascending order.
    pub fn iter_next(&mut self) -> Option<u64> {
        let (snapshot, at) = self.iter.as_mut()?;
        while let Some(&id) = snapshot.get(*at) {
            *at += 1;
            if self.ids.contains(id) {
                return Some(id);
            }
        }
        self.iter = None;
        None
    }

    /// Live ids in `lower..=upper`, at most `max` of them.
    pub fn range_ids(&self, lower: u64, upper: u64, max: Option<usize>) -> Vec<u64> {
        self.stats.record_scan();
        let limit = max.unwrap_or(usize::MAX);
        if lower > upper {
            return Vec::new();
        }
        let mut ids = self.ids.iter();
        ids.advance_to(lower);
        ids.take_while(|&id| id <= upper).take(limit).collect()
    }

    /// Live ids inside a textual interval, at most `max` of them.
    pub fn range(&self, interval: &str, max: Option<usize>) -> Result<Vec<u64>> {
        self.ensure_open()?;
        let iv = IdInterval::parse(interval)?;
        let (min, max_id) = match (self.ids.min(), self.ids.max()) {
            (Some(min), Some(max_id)) => (min, max_id),
            _ => return Ok(Vec::new()),
        };
        let pin = |end: Endpoint| match end {
            Endpoint::Id(id) => id,
            Endpoint::Min => min,
            Endpoint::Max => max_id,
        };
        let mut lower = pin(iv.lower);
        if !iv.lower_inclusive {
            lower = lower.saturating_add(1);
        }
        let mut upper = pin(iv.upper);
        if !iv.upper_inclusive {
            match upper.checked_sub(1) {
                Some(below) => upper = below,
                None => return Ok(Vec::new()),
            }
        }
        Ok(self.range_ids(lower, upper, max))
    }

    /// Calls `f` with every record in id order until it returns false.
    pub fn scan<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(u64, Bytes) -> Result<bool>,
    {
        self.stats.record_scan();
        let ids: Vec<u64> = self.ids.iter().collect();
        for id in ids {
            if let Some(value) = self.read_slot(id)? {
                if !f(id, value)? {
                    break;
                }
            }
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.ensure_writer()?;
        self.header.flags &= !HEADER_FLAG_DIRTY;
        self.write_header()?;
        self.io.flush()
    }

    pub fn vanish(&mut self) -> Result<()> {
        self.ensure_writer()?;
        self.io.set_len(FIXED_HEADER_SIZE as u64)?;
        self.ids.clear();
        self.iter = None;
        self.header.rnum = 0;
        self.header.fsiz = FIXED_HEADER_SIZE as u64;
        self.sync()?;
        tracing::debug!(path = %self.path.display(), "vanished database");
        Ok(())
    }

    pub fn copy_to(&mut self, dest: &Path) -> Result<()> {
        if self.writer {
            self.sync()?;
        }
        std::fs::copy(&self.path, dest).map_err(|e| ShelfError::io(IoOp::Write, e))?;
        tracing::debug!(from = %self.path.display(), to = %dest.display(), "copied database");
        Ok(())
    }

    /// Rewrites the file with a new slot width and size ceiling.
    ///
    /// Fails with `Invalid`, leaving the file untouched, if a record does not
    /// fit the new geometry.
    pub fn optimize(&mut self, tuning: FixedTuning) -> Result<()> {
        self.ensure_writer()?;
        let tmp = temp_path(&self.path);
        let mode = OpenMode::truncate().with_lock(LockPolicy::NoLock);
        let mut sibling = FixedCore::open(&tmp, mode, tuning.normalized(), self.stats.clone())?;
        let copied = self.scan(|id, value| {
            sibling.put(FixedKey::Id(id), &value, PutMode::Overwrite)?;
            Ok(true)
        });
        if let Err(e) = copied.and_then(|_| sibling.close()) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        self.sync()?;
        replace_file(&tmp, &self.path)?;
        self.reopen(tuning)?;
        tracing::debug!(
            path = %self.path.display(),
            width = self.header.width,
            rnum = self.rnum(),
            "optimized fixed-length database"
        );
        Ok(())
    }

    /// Swaps in a fresh connection to the same path.
    ///
    /// On failure the handle stays closed and every later call reports it.
    pub(crate) fn reopen(&mut self, tuning: FixedTuning) -> Result<()> {
        let mode = OpenMode::writer().with_lock(match self.mode.lock {
            LockPolicy::NoLock => LockPolicy::NoLock,
            _ => LockPolicy::Blocking,
        });
        self.closed = true;
        self.iter = None;
        self.lock.take();
        match FixedCore::open(&self.path.clone(), mode, tuning, self.stats.clone()) {
            Ok(core) => {
                *self = core;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "reopen failed, connection closed"
                );
                Err(e)
            }
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = if self.writer {
            self.header.flags &= !HEADER_FLAG_DIRTY;
            self.write_header().and_then(|_| self.io.flush())
        } else {
            Ok(())
        };
        self.lock.take();
        tracing::debug!(path = %self.path.display(), "closed database file");
        result
    }

    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }
}

impl Drop for FixedCore {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(path = %self.path.display(), error = %e, "closing on drop failed");
        }
    }
}
