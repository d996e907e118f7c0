use ahash::AHashSet;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::*;
use crate::core::options::{CreatePolicy, HashTuning, OpenMode};
use crate::error::{IoOp, Result, ShelfError};
use crate::stats::Statistics;
use crate::storage::format::{decode_payload, BlockHeader, EncodedRecord};
use crate::storage::free_space::{FreeSpace, FreeSpaceManager};
use crate::storage::header::{align_up, read_u64, FileHeader};
use crate::storage::io::DiskIO;
use crate::storage::lock::FileLock;

/// A block header together with the payload bytes fetched alongside it.
#[derive(Debug, Clone)]
pub struct BlockRef {
    pub offset: u64,
    pub header: BlockHeader,
    prefix: Vec<u8>,
}

/// Single-file block store: header, bucket array, free pool area and an
/// aligned data region of variable-size blocks.
pub struct BlockStore {
    path: PathBuf,
    io: DiskIO,
    header: FileHeader,
    buckets: Vec<u64>,
    pool: FreeSpaceManager,
    writer: bool,
    closed: bool,
    lock: Option<FileLock>,
    stats: Arc<Statistics>,
}

impl BlockStore {
    /// Opens or creates a block file. `tuning` only applies when a new file is laid out.
    pub fn open(
        path: &Path,
        mode: OpenMode,
        kind: EngineKind,
        tuning: HashTuning,
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
        if len == 0 {
            if !mode.is_writer() {
                return Err(ShelfError::Meta("database file is empty"));
            }
            let header = FileHeader::new(kind, &tuning.normalized());
            let mut store = Self::assemble(path, io, header, lock, true, stats);
            store.format()?;
            tracing::debug!(path = %path.display(), ?kind, "created database file");
            return Ok(store);
        }

        let raw = io.read_at(0, FILE_HEADER_SIZE.min(len as usize))?;
        let header = FileHeader::decode(&raw)?;
        if header.kind != kind {
            return Err(ShelfError::Meta("file holds a different engine kind"));
        }

        let mut store = Self::assemble(path, io, header, lock, mode.is_writer(), stats);
        store.load_buckets()?;
        if store.writer {
            if store.header.is_dirty() {
                store.recover()?;
            } else {
                store.load_pool()?;
            }
        }
        tracing::debug!(
            path = %path.display(),
            rnum = store.header.rnum,
            fsiz = store.header.fsiz,
            writer = store.writer,
            "opened database file"
        );
        Ok(store)
    }

    fn assemble(
        path: &Path,
        io: DiskIO,
        header: FileHeader,
        lock: FileLock,
        writer: bool,
        stats: Arc<Statistics>,
    ) -> Self {
        let min_block = align_up(RECORD_HEADER_SIZE as u64, header.align());
        let pool = FreeSpaceManager::new(header.pool_capacity(), min_block);
        Self {
            path: path.to_path_buf(),
            io,
            buckets: Vec::new(),
            pool,
            writer,
            closed: false,
            lock: Some(lock),
            stats,
            header,
        }
    }

    /// Lays out an empty file for the current header.
    fn format(&mut self) -> Result<()> {
        self.header.rnum = 0;
        self.header.fsiz = self.header.data_start();
        self.header.set_dirty(false);
        self.buckets = vec![0; self.header.bnum as usize];
        self.pool.clear();

        self.io.set_len(FILE_HEADER_SIZE as u64)?;
        self.io.set_len(self.header.fsiz)?;
        self.io.write_at(0, &self.header.encode())?;
        self.io.flush()
    }

    fn load_buckets(&mut self) -> Result<()> {
        let raw = self
            .io
            .read_at(self.header.bucket_offset(), self.header.bnum as usize * 8)?;
        self.buckets = raw.chunks_exact(8).map(|c| read_u64(c, 0)).collect();
        Ok(())
    }

    fn load_pool(&mut self) -> Result<()> {
        let raw = self.io.read_at(
            self.header.pool_offset(),
            self.header.pool_capacity() * POOL_ENTRY_SIZE,
        )?;
        let data_start = self.header.data_start();
        let fsiz = self.header.fsiz;
        let regions = raw
            .chunks_exact(POOL_ENTRY_SIZE)
            .map(|c| FreeSpace {
                start: read_u64(c, 0),
                size: read_u64(c, 8),
            })
            .take_while(|r| r.start != 0)
            .filter(|r| r.start >= data_start && r.end() <= fsiz)
            .collect::<Vec<_>>();
        self.pool.load(regions);
        Ok(())
    }

    /// Rebuilds the pool and record count of a file that was not closed cleanly.
    ///
    /// Records reachable from a bucket chain are kept; every other block in
    /// the data region becomes free space. A torn block at the tail is cut off.
    fn recover(&mut self) -> Result<()> {
        tracing::warn!(
            path = %self.path.display(),
            "database was not closed cleanly, rebuilding free pool"
        );
        let file_end = self.io.file_len()?;
        self.header.fsiz = file_end;

        let mut reachable = AHashSet::new();
        for idx in 0..self.buckets.len() {
            let mut prev = 0u64;
            let mut off = self.buckets[idx];
            while off != 0 {
                let block = match self.read_block(off) {
                    Ok(block) if block.header.is_used() && reachable.insert(off) => block,
                    _ => {
                        tracing::warn!(bucket = idx, offset = off, "cutting broken chain");
                        if prev == 0 {
                            self.set_bucket(idx, 0)?;
                        } else {
                            self.write_next(prev, 0)?;
                        }
                        break;
                    }
                };
                prev = off;
                off = block.header.next;
            }
        }

        let mut free = Vec::new();
        let mut off = self.header.data_start();
        while off + RECORD_HEADER_SIZE as u64 <= file_end {
            let raw = self.io.read_at(off, RECORD_HEADER_SIZE)?;
            let header = match BlockHeader::decode(&raw, off) {
                Ok(h) if off + h.size as u64 <= file_end => h,
                _ => break,
            };
            if !(header.is_used() && reachable.contains(&off)) {
                if header.is_used() {
                    self.io
                        .write_at(off, &BlockHeader::free(header.size as u64).encode())?;
                }
                free.push(FreeSpace {
                    start: off,
                    size: header.size as u64,
                });
            }
            off += header.size as u64;
        }
        let mut end = file_end;
        if off < file_end && reachable.iter().all(|&r| r < off) {
            tracing::warn!(offset = off, "truncating torn tail of the data region");
            self.io.set_len(off)?;
            end = off;
        }

        self.pool.clear();
        self.pool.load(free);
        self.header.fsiz = end;
        self.header.rnum = reachable.len() as u64;
        self.sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut FileHeader {
        &mut self.header
    }

    pub fn stats(&self) -> &Arc<Statistics> {
        &self.stats
    }

    pub fn is_writer(&self) -> bool {
        self.writer
    }

    pub fn pool(&self) -> &FreeSpaceManager {
        &self.pool
    }

    pub fn ensure_writer(&self) -> Result<()> {
        if self.writer {
            Ok(())
        } else {
            Err(ShelfError::Invalid("connection is read-only"))
        }
    }

    pub fn rnum(&self) -> u64 {
        self.header.rnum
    }

    pub fn fsiz(&self) -> u64 {
        self.header.fsiz
    }

    pub fn bnum(&self) -> u64 {
        self.header.bnum
    }

    pub fn bucket(&self, idx: usize) -> u64 {
        self.buckets[idx]
    }

    pub fn set_bucket(&mut self, idx: usize, offset: u64) -> Result<()> {
        self.buckets[idx] = offset;
        self.io.write_at(
            self.header.bucket_offset() + idx as u64 * 8,
            &offset.to_le_bytes(),
        )
    }

    /// Reads a block header plus up to [`BLOCK_PREFETCH`] bytes of payload.
    pub fn read_block(&self, offset: u64) -> Result<BlockRef> {
        if offset < self.header.data_start() || offset >= self.header.fsiz {
            return Err(ShelfError::RecordHeader { offset });
        }
        let avail = (self.header.fsiz - offset) as usize;
        if avail < RECORD_HEADER_SIZE {
            return Err(ShelfError::RecordHeader { offset });
        }
        let raw = self
            .io
            .read_at(offset, avail.min(RECORD_HEADER_SIZE + BLOCK_PREFETCH))?;
        let header = BlockHeader::decode(&raw, offset)?;
        if offset + header.size as u64 > self.header.fsiz {
            return Err(ShelfError::RecordHeader { offset });
        }
        let mut prefix = raw[RECORD_HEADER_SIZE..].to_vec();
        prefix.truncate(header.payload_len());
        Ok(BlockRef {
            offset,
            header,
            prefix,
        })
    }

    /// Key bytes of a used block.
    pub fn read_key(&self, block: &BlockRef) -> Result<Vec<u8>> {
        let key_len = block.header.key_len as usize;
        if block.prefix.len() >= key_len {
            return Ok(block.prefix[..key_len].to_vec());
        }
        self.io
            .read_at(block.offset + RECORD_HEADER_SIZE as u64, key_len)
    }

    /// Decoded key and value of a used block, checksum verified.
    pub fn read_record(&self, block: &BlockRef) -> Result<(Bytes, Bytes)> {
        if !block.header.is_used() {
            return Err(ShelfError::RecordHeader {
                offset: block.offset,
            });
        }
        let total = block.header.payload_len();
        if block.prefix.len() >= total {
            return decode_payload(&block.header, &block.prefix, block.offset);
        }
        let payload = self
            .io
            .read_at(block.offset + RECORD_HEADER_SIZE as u64, total)?;
        decode_payload(&block.header, &payload, block.offset)
    }

    /// Reserves a block of at least `len` bytes, from the pool first.
    pub fn allocate(&mut self, len: u64) -> Result<(u64, u64)> {
        let size = align_up(len, self.header.align());
        if size > u32::MAX as u64 {
            return Err(ShelfError::Invalid("record too large"));
        }

        if let Some(allocation) = self.pool.allocate(size) {
            if let Some(rest) = allocation.remainder {
                self.io
                    .write_at(rest.start, &BlockHeader::free(rest.size).encode())?;
            }
            return Ok((allocation.start, allocation.size));
        }

        let start = self.header.fsiz;
        let end = start + size;
        if !self.header.tuning().opts.large && end > SMALL_FILE_LIMIT {
            return Err(ShelfError::Invalid(
                "file would exceed 2GB without the large option",
            ));
        }
        self.header.fsiz = end;
        Ok((start, size))
    }

    /// Marks a block free and returns it to the pool.
    pub fn free(&mut self, offset: u64, size: u64) -> Result<()> {
        self.io
            .write_at(offset, &BlockHeader::free(size).encode())?;
        let merged = self.pool.release(offset, size)?;
        if merged.start != offset || merged.size != size {
            self.io
                .write_at(merged.start, &BlockHeader::free(merged.size).encode())?;
        }
        Ok(())
    }

    /// Writes a record into a block previously returned by [`allocate`](Self::allocate).
    pub fn write_record(
        &mut self,
        offset: u64,
        size: u64,
        record: &EncodedRecord,
        next: u64,
    ) -> Result<()> {
        self.io.write_at(offset, &record.to_block(size, next))
    }

    /// Rewrites the chain link of a used block.
    pub fn write_next(&mut self, offset: u64, next: u64) -> Result<()> {
        self.io.write_at(offset + 8, &next.to_le_bytes())
    }

    /// Sets the open-state flag before the first mutation since the last sync.
    pub fn begin_mutation(&mut self) -> Result<()> {
        self.ensure_writer()?;
        if !self.header.is_dirty() {
            self.header.set_dirty(true);
            self.write_dynamic()?;
        }
        Ok(())
    }

    /// Writes the flags, record count and file size through to the header.
    pub fn write_dynamic(&mut self) -> Result<()> {
        let (at, bytes) = self.header.dynamic_bytes();
        self.io.write_at(at, &bytes)
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.io.write_at(0, &self.header.encode())
    }

    fn write_pool(&mut self) -> Result<()> {
        let capacity = self.header.pool_capacity();
        let mut area = vec![0u8; capacity * POOL_ENTRY_SIZE];
        for (slot, region) in area
            .chunks_exact_mut(POOL_ENTRY_SIZE)
            .zip(self.pool.regions().take(capacity))
        {
            slot[0..8].copy_from_slice(&region.start.to_le_bytes());
            slot[8..16].copy_from_slice(&region.size.to_le_bytes());
        }
        self.io.write_at(self.header.pool_offset(), &area)
    }

    /// Persists the free pool and a clean header, then syncs the file.
    pub fn sync(&mut self) -> Result<()> {
        self.ensure_writer()?;
        self.write_pool()?;
        self.header.set_dirty(false);
        self.write_header()?;
        self.io.flush()
    }

    /// Drops every record, keeping the tuning of the file.
    pub fn vanish(&mut self) -> Result<()> {
        self.ensure_writer()?;
        self.format()
    }

    /// Syncs and copies the file byte for byte to `dest`.
    pub fn copy_to(&mut self, dest: &Path) -> Result<()> {
        if self.writer {
            self.sync()?;
        }
        std::fs::copy(&self.path, dest).map_err(|e| ShelfError::io(IoOp::Write, e))?;
        Ok(())
    }

    /// Gives up the file lock without syncing; the store must not be used afterwards.
    pub fn detach(&mut self) {
        self.closed = true;
        self.lock.take();
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.writer {
            self.sync()?;
        }
        self.lock.take();
        tracing::debug!(path = %self.path.display(), "closed database file");
        Ok(())
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        if !self.closed && self.writer && self.header.is_dirty() {
            if let Err(e) = self.sync() {
                tracing::warn!(path = %self.path.display(), error = %e, "sync on drop failed");
            }
        }
    }
}

pub(crate) fn open_file(path: &Path, mode: &OpenMode) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    if mode.is_writer() {
        options
            .write(true)
            .create(mode.create != CreatePolicy::MustExist);
    }
    options
        .open(path)
        .map_err(|e| ShelfError::io(IoOp::Open, e))
}

/// Sibling path used while rebuilding a file.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".tmp.{}", std::process::id()));
    PathBuf::from(name)
}

/// Moves a rebuilt file over the original.
pub(crate) fn replace_file(tmp: &Path, path: &Path) -> Result<()> {
    std::fs::rename(tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(tmp);
        ShelfError::io(IoOp::Rename, e)
    })
}
