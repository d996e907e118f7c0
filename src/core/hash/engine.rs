use bytes::{Bytes, BytesMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::EngineKind;
use crate::core::cache::ClockCache;
use crate::core::options::{Compression, CreatePolicy, HashTuning, LockPolicy, OpenMode};
use crate::error::{Result, ShelfError};
use crate::stats::Statistics;
use crate::storage::block_store::{replace_file, temp_path, BlockRef, BlockStore};
use crate::storage::format::EncodedRecord;
use crate::storage::write_buffer::WriteBuffer;
use crate::utils::hash::bucket_index;

/// Overwrite policy of a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    Overwrite,
    Keep,
    Concat,
}

/// Where a key lives, or would be linked, in its chain.
struct Location {
    bucket: usize,
    /// Block whose `next` points at the match; 0 when the match is the chain head.
    prev: u64,
    block: Option<BlockRef>,
}

/// Position of the bucket-then-chain iterator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterPos {
    pub bucket: usize,
    pub next: u64,
}

/// Hash table over a [`BlockStore`]. Not synchronized; owners wrap it in a lock.
pub struct HashCore {
    store: BlockStore,
    cache: ClockCache,
    buffer: WriteBuffer,
    iter: Option<IterPos>,
    mode: OpenMode,
    stats: Arc<Statistics>,
}

impl HashCore {
    pub fn open(
        path: &Path,
        mode: OpenMode,
        kind: EngineKind,
        tuning: HashTuning,
        rcnum: usize,
        stats: Arc<Statistics>,
    ) -> Result<Self> {
        let store = BlockStore::open(path, mode, kind, tuning, stats.clone())?;
        Ok(Self {
            store,
            cache: ClockCache::new(rcnum, stats.clone()),
            buffer: WriteBuffer::new(stats.clone()),
            iter: None,
            mode,
            stats,
        })
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut BlockStore {
        &mut self.store
    }

    pub fn stats(&self) -> &Arc<Statistics> {
        &self.stats
    }

    pub fn path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    pub fn rnum(&self) -> u64 {
        self.store.rnum()
    }

    pub fn fsiz(&self) -> u64 {
        self.store.fsiz()
    }

    pub fn tuning(&self) -> HashTuning {
        self.store.header().tuning()
    }

    fn compress(&self) -> bool {
        self.tuning().opts.compress == Compression::Snappy
    }

    fn locate(&self, key: &[u8]) -> Result<Location> {
        let bucket = bucket_index(key, self.store.bnum());
        let mut prev = 0;
        let mut off = self.store.bucket(bucket);
        while off != 0 {
            let block = self.store.read_block(off)?;
            if !block.header.is_used() {
                return Err(ShelfError::RecordHeader { offset: off });
            }
            if block.header.key_len as usize == key.len() && self.store.read_key(&block)? == key {
                return Ok(Location {
                    bucket,
                    prev,
                    block: Some(block),
                });
            }
            prev = off;
            off = block.header.next;
        }
        Ok(Location {
            bucket,
            prev,
            block: None,
        })
    }

    /// Applies every buffered `putasync` write.
    pub fn flush_async(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut batch = self.buffer.drain().into_iter();
        while let Some(entry) = batch.next() {
            if let Err(e) = self.store_record(&entry.key, &entry.value, PutMode::Overwrite) {
                let mut pending = vec![entry];
                pending.extend(batch);
                self.buffer.restore(pending);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn put(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> Result<bool> {
        self.flush_async()?;
        self.stats.record_put();
        self.store_record(key, value, mode)
    }

    pub fn put_async(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.store.ensure_writer()?;
        self.stats.record_put();
        if self.buffer.add_write(key, value) {
            self.flush_async()?;
        }
        Ok(())
    }

    fn store_record(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> Result<bool> {
        self.store.begin_mutation()?;
        let loc = self.locate(key)?;

        let joined;
        let value = match (&loc.block, mode) {
            (Some(_), PutMode::Keep) => return Ok(false),
            (Some(block), PutMode::Concat) => {
                let (_, old) = self.store.read_record(block)?;
                let mut buf = BytesMut::with_capacity(old.len() + value.len());
                buf.extend_from_slice(&old);
                buf.extend_from_slice(value);
                joined = buf.freeze();
                &joined[..]
            }
            _ => value,
        };

        let record = EncodedRecord::new(key, value, self.compress())?;
        match loc.block {
            Some(block) if record.raw_len() <= block.header.size as u64 => {
                let size = block.header.size as u64;
                self.store
                    .write_record(block.offset, size, &record, block.header.next)?;
            }
            Some(block) => {
                let (offset, size) = self.store.allocate(record.raw_len())?;
                self.store
                    .write_record(offset, size, &record, block.header.next)?;
                self.relink(loc.bucket, loc.prev, offset)?;
                self.store.free(block.offset, block.header.size as u64)?;
            }
            None => {
                let head = self.store.bucket(loc.bucket);
                let (offset, size) = self.store.allocate(record.raw_len())?;
                self.store.write_record(offset, size, &record, head)?;
                self.store.set_bucket(loc.bucket, offset)?;
                self.store.header_mut().rnum += 1;
            }
        }

        if self.cache.capacity() > 0 {
            self.cache.insert(key, Bytes::copy_from_slice(value));
        }
        self.store.write_dynamic()?;
        Ok(true)
    }

    fn relink(&mut self, bucket: usize, prev: u64, target: u64) -> Result<()> {
        if prev == 0 {
            self.store.set_bucket(bucket, target)
        } else {
            self.store.write_next(prev, target)
        }
    }

    /// Removes `key`; returns whether it existed.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.flush_async()?;
        self.store.begin_mutation()?;
        self.stats.record_delete();

        let loc = self.locate(key)?;
        let block = match loc.block {
            Some(block) => block,
            None => return Ok(false),
        };
        self.relink(loc.bucket, loc.prev, block.header.next)?;
        self.store.free(block.offset, block.header.size as u64)?;
        self.cache.remove(key);

        let header = self.store.header_mut();
        header.rnum = header.rnum.saturating_sub(1);
        self.store.write_dynamic()?;
        Ok(true)
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        self.flush_async()?;
        self.stats.record_get();

        if self.cache.capacity() > 0 {
            if let Some(value) = self.cache.get(key) {
                return Ok(Some(value));
            }
        }

        let loc = self.locate(key)?;
        match loc.block {
            Some(block) => {
                let (_, value) = self.store.read_record(&block)?;
                if self.cache.capacity() > 0 {
                    self.cache.insert(key, value.clone());
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn vsiz(&mut self, key: &[u8]) -> Result<Option<usize>> {
        self.flush_async()?;
        let loc = self.locate(key)?;
        match loc.block {
            Some(block) if block.header.is_compressed() => {
                let (_, value) = self.store.read_record(&block)?;
                Ok(Some(value.len()))
            }
            Some(block) => Ok(Some(block.header.val_len as usize)),
            None => Ok(None),
        }
    }

    pub fn iter_init(&mut self) -> Result<()> {
        self.flush_async()?;
        self.iter = Some(self.first_pos());
        Ok(())
    }

    pub fn iter_next(&mut self) -> Result<Option<Bytes>> {
        self.flush_async()?;
        let pos = match self.iter {
            Some(pos) => pos,
            None => return Ok(None),
        };
        match self.record_at(pos)? {
            Some((key, _, next)) => {
                self.iter = Some(next);
                Ok(Some(key))
            }
            None => {
                self.iter = None;
                Ok(None)
            }
        }
    }

    pub fn first_pos(&self) -> IterPos {
        IterPos {
            bucket: 0,
            next: if self.store.bnum() > 0 {
                self.store.bucket(0)
            } else {
                0
            },
        }
    }

    /// Record at or after `pos` in bucket-then-chain order, and the position after it.
    pub fn record_at(&self, mut pos: IterPos) -> Result<Option<(Bytes, Bytes, IterPos)>> {
        let bnum = self.store.bnum() as usize;
        while pos.next == 0 {
            pos.bucket += 1;
            if pos.bucket >= bnum {
                return Ok(None);
            }
            pos.next = self.store.bucket(pos.bucket);
        }
        let block = self.store.read_block(pos.next)?;
        let (key, value) = self.store.read_record(&block)?;
        Ok(Some((
            key,
            value,
            IterPos {
                bucket: pos.bucket,
                next: block.header.next,
            },
        )))
    }

    /// Visits every record until `f` returns false.
    pub fn scan<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Bytes, Bytes) -> Result<bool>,
    {
        self.flush_async()?;
        self.stats.record_scan();
        let mut pos = self.first_pos();
        while let Some((key, value, next)) = self.record_at(pos)? {
            if !f(key, value)? {
                break;
            }
            pos = next;
        }
        Ok(())
    }

    pub fn fwmkeys(&mut self, prefix: &[u8], max: Option<usize>) -> Result<Vec<Bytes>> {
        let limit = max.unwrap_or(usize::MAX);
        let mut keys = Vec::new();
        if limit == 0 {
            return Ok(keys);
        }
        self.scan(|key, _| {
            if key.starts_with(prefix) {
                keys.push(key);
            }
            Ok(keys.len() < limit)
        })?;
        Ok(keys)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.flush_async()?;
        self.store.sync()
    }

    pub fn vanish(&mut self) -> Result<()> {
        self.store.ensure_writer()?;
        self.buffer.drain();
        self.cache.clear();
        self.iter = None;
        self.store.vanish()?;
        tracing::debug!(path = %self.store.path().display(), "vanished database");
        Ok(())
    }

    pub fn copy_to(&mut self, dest: &Path) -> Result<()> {
        self.flush_async()?;
        self.store.copy_to(dest)?;
        tracing::debug!(from = %self.store.path().display(), to = %dest.display(), "copied database");
        Ok(())
    }

    /// Opens an empty sibling file with the given layout for a rebuild.
    pub fn create_sibling(&self, kind: EngineKind, tuning: HashTuning) -> Result<(PathBuf, HashCore)> {
        let tmp = temp_path(self.store.path());
        let mode = OpenMode::truncate().with_lock(LockPolicy::NoLock);
        let core = HashCore::open(&tmp, mode, kind, tuning, 0, self.stats.clone())?;
        Ok((tmp, core))
    }

    /// Moves a rebuilt sibling over this file and reopens on it.
    pub fn adopt(&mut self, tmp: &Path, sibling: HashCore) -> Result<()> {
        if let Err(e) = sibling.close() {
            let _ = std::fs::remove_file(tmp);
            return Err(e);
        }
        self.store.sync()?;
        let path = self.path();
        replace_file(tmp, &path)?;

        let mode = OpenMode {
            create: CreatePolicy::MustExist,
            lock: match self.mode.lock {
                LockPolicy::NoLock => LockPolicy::NoLock,
                _ => LockPolicy::Blocking,
            },
            ..self.mode
        };
        let kind = self.store.header().kind;
        let tuning = self.tuning();
        self.store.detach();
        self.store = BlockStore::open(&path, mode, kind, tuning, self.stats.clone())?;
        self.cache.clear();
        self.iter = None;
        Ok(())
    }

    /// Flushes and closes the store in place; later calls must not touch the file.
    pub fn shutdown(&mut self) -> Result<()> {
        self.flush_async()?;
        self.store.close()
    }

    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }
}

impl Drop for HashCore {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            if let Err(e) = self.flush_async() {
                tracing::warn!(error = %e, "dropping buffered writes");
            }
        }
    }
}
