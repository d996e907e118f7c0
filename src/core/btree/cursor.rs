use bytes::Bytes;

use crate::error::{Result, ShelfError};

use super::ops::{lower_bound, search};
use super::tree::TreeCore;
use super::BTreeDb;

/// A record position: leaf, entry within the leaf, value within the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPos {
    pub leaf: u64,
    pub idx: usize,
    pub vidx: usize,
}

/// Where [`Cursor::put`] places the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorPutMode {
    /// Replace the current value.
    #[default]
    Current,
    /// Insert a duplicate before the current value.
    Before,
    /// Insert a duplicate after the current value.
    After,
}

impl TreeCore {
    /// Moves forward from `pos` to the first position holding a value.
    fn settle_forward(&mut self, mut pos: CursorPos) -> Result<Option<CursorPos>> {
        while pos.leaf != 0 {
            let leaf = self.leaf_ref(pos.leaf)?;
            while pos.idx < leaf.entries.len() {
                if pos.vidx < leaf.entries[pos.idx].values.len() {
                    return Ok(Some(pos));
                }
                pos.idx += 1;
                pos.vidx = 0;
            }
            pos = CursorPos {
                leaf: leaf.next,
                idx: 0,
                vidx: 0,
            };
        }
        Ok(None)
    }

    /// Last position of the first non-empty leaf at or before `leaf_id`.
    fn tail_of(&mut self, mut leaf_id: u64) -> Result<Option<CursorPos>> {
        while leaf_id != 0 {
            let leaf = self.leaf_ref(leaf_id)?;
            if let Some(entry) = leaf.entries.last() {
                return Ok(Some(CursorPos {
                    leaf: leaf_id,
                    idx: leaf.entries.len() - 1,
                    vidx: entry.values.len().saturating_sub(1),
                }));
            }
            leaf_id = leaf.prev;
        }
        Ok(None)
    }

    pub(super) fn pos_first(&mut self) -> Result<Option<CursorPos>> {
        let first = self.meta.first;
        self.settle_forward(CursorPos {
            leaf: first,
            idx: 0,
            vidx: 0,
        })
    }

    pub(super) fn pos_last(&mut self) -> Result<Option<CursorPos>> {
        let last = self.meta.last;
        self.tail_of(last)
    }

    /// First value of the first key at or after `key`.
    pub(super) fn pos_jump(&mut self, key: &[u8]) -> Result<Option<CursorPos>> {
        let cmp = self.cmp.clone();
        let (_, leaf_id) = self.descend(key)?;
        let leaf = self.leaf_ref(leaf_id)?;
        let idx = lower_bound(&cmp, &leaf.entries, key, false);
        self.settle_forward(CursorPos {
            leaf: leaf_id,
            idx,
            vidx: 0,
        })
    }

    /// Value `vidx` of `key`, or the first value of the next key when `key` has no such value.
    pub(super) fn pos_seek(&mut self, key: &[u8], vidx: usize) -> Result<Option<CursorPos>> {
        let cmp = self.cmp.clone();
        let (_, leaf_id) = self.descend(key)?;
        let leaf = self.leaf_ref(leaf_id)?;
        if let Ok(idx) = search(&cmp, &leaf.entries, key) {
            if vidx < leaf.entries[idx].values.len() {
                return Ok(Some(CursorPos {
                    leaf: leaf_id,
                    idx,
                    vidx,
                }));
            }
        }
        let idx = lower_bound(&cmp, &leaf.entries, key, true);
        self.settle_forward(CursorPos {
            leaf: leaf_id,
            idx,
            vidx: 0,
        })
    }

    pub(super) fn pos_next(&mut self, pos: CursorPos) -> Result<Option<CursorPos>> {
        self.settle_forward(CursorPos {
            vidx: pos.vidx + 1,
            ..pos
        })
    }

    pub(super) fn pos_prev(&mut self, pos: CursorPos) -> Result<Option<CursorPos>> {
        if pos.vidx > 0 {
            return Ok(Some(CursorPos {
                vidx: pos.vidx - 1,
                ..pos
            }));
        }
        let leaf = self.leaf_ref(pos.leaf)?;
        if pos.idx > 0 && !leaf.entries.is_empty() {
            let idx = pos.idx.min(leaf.entries.len()) - 1;
            return Ok(Some(CursorPos {
                leaf: pos.leaf,
                idx,
                vidx: leaf.entries[idx].values.len().saturating_sub(1),
            }));
        }
        let prev = leaf.prev;
        self.tail_of(prev)
    }

    pub(super) fn pos_record(&mut self, pos: CursorPos) -> Result<(Bytes, Bytes)> {
        let leaf = self.leaf_ref(pos.leaf)?;
        leaf.entries
            .get(pos.idx)
            .and_then(|entry| {
                entry
                    .values
                    .get(pos.vidx)
                    .map(|value| (entry.key.clone(), value.clone()))
            })
            .ok_or(ShelfError::NoRecord)
    }
}

/// Positioned reader and editor over the records of a [`BTreeDb`].
///
/// Each duplicate value is its own record, visited in insertion order. A
/// cursor holds no lock between calls. Any change to the tree not made
/// through this cursor invalidates it: calls other than the seeks then fail
/// with `Invalid` until it is positioned again.
///
/// # Example
///
/// ```no_run
/// use shelfdb::{BTreeDb, OpenMode};
///
/// # fn main() -> shelfdb::Result<()> {
/// let db = BTreeDb::open("casket.sbt", OpenMode::create())?;
/// db.put(b"a", b"1")?;
/// db.put(b"b", b"2")?;
///
/// let mut cur = db.cursor();
/// let mut ok = cur.first()?;
/// while ok {
///     let (key, value) = cur.record()?;
///     println!("{:?} => {:?}", key, value);
///     ok = cur.next()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Cursor<'a> {
    db: &'a BTreeDb,
    pos: Option<CursorPos>,
    epoch: u64,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(db: &'a BTreeDb) -> Self {
        Self {
            db,
            pos: None,
            epoch: 0,
        }
    }

    fn place(&mut self, core: &TreeCore, pos: Option<CursorPos>) -> bool {
        self.pos = pos;
        self.epoch = core.epoch;
        pos.is_some()
    }

    fn current(&self, core: &TreeCore) -> Result<CursorPos> {
        let pos = self.pos.ok_or(ShelfError::NoRecord)?;
        if self.epoch != core.epoch {
            return Err(ShelfError::Invalid("cursor was invalidated by a change to the tree"));
        }
        Ok(pos)
    }

    /// Moves to the first record; false when the tree is empty.
    pub fn first(&mut self) -> Result<bool> {
        let mut core = self.db.lock();
        let pos = core.pos_first()?;
        Ok(self.place(&core, pos))
    }

    /// Moves to the last record; false when the tree is empty.
    pub fn last(&mut self) -> Result<bool> {
        let mut core = self.db.lock();
        let pos = core.pos_last()?;
        Ok(self.place(&core, pos))
    }

    /// Moves to the first record whose key is at or after `key`.
    pub fn jump(&mut self, key: &[u8]) -> Result<bool> {
        let mut core = self.db.lock();
        let pos = core.pos_jump(key)?;
        Ok(self.place(&core, pos))
    }

    /// Advances; false (and unpositioned) past the last record.
    pub fn next(&mut self) -> Result<bool> {
        let mut core = self.db.lock();
        let pos = self.current(&core)?;
        let pos = core.pos_next(pos)?;
        Ok(self.place(&core, pos))
    }

    /// Steps back; false (and unpositioned) before the first record.
    pub fn prev(&mut self) -> Result<bool> {
        let mut core = self.db.lock();
        let pos = self.current(&core)?;
        let pos = core.pos_prev(pos)?;
        Ok(self.place(&core, pos))
    }

    pub fn is_positioned(&self) -> bool {
        self.pos.is_some()
    }

    pub fn key(&self) -> Result<Bytes> {
        Ok(self.record()?.0)
    }

    pub fn val(&self) -> Result<Bytes> {
        Ok(self.record()?.1)
    }

    pub fn record(&self) -> Result<(Bytes, Bytes)> {
        let mut core = self.db.lock();
        let pos = self.current(&core)?;
        core.pos_record(pos)
    }

    /// Writes `value` relative to the current record and stays on the written record.
    pub fn put(&mut self, value: &[u8], mode: CursorPutMode) -> Result<()> {
        let mut core = self.db.lock();
        let pos = self.current(&core)?;
        let (key, _) = core.pos_record(pos)?;
        let value = Bytes::copy_from_slice(value);
        let vidx = pos.vidx;
        core.stats.record_put();
        let target = core.update(&key, |entries, slot| {
            let Ok(idx) = slot else {
                return (vidx, 0);
            };
            let values = &mut entries[idx].values;
            match mode {
                CursorPutMode::Current => {
                    values[vidx] = value;
                    (vidx, 0)
                }
                CursorPutMode::Before => {
                    values.insert(vidx, value);
                    (vidx, 1)
                }
                CursorPutMode::After => {
                    values.insert(vidx + 1, value);
                    (vidx + 1, 1)
                }
            }
        })?;
        let pos = core.pos_seek(&key, target)?;
        self.place(&core, pos);
        Ok(())
    }

    /// Removes the current record and moves to the one after it.
    ///
    /// The cursor is left unpositioned when no record follows.
    pub fn out(&mut self) -> Result<()> {
        let mut core = self.db.lock();
        let pos = self.current(&core)?;
        let (key, _) = core.pos_record(pos)?;
        let vidx = pos.vidx;
        core.stats.record_delete();
        core.update(&key, |entries, slot| {
            let Ok(idx) = slot else {
                return ((), 0);
            };
            entries[idx].values.remove(vidx);
            if entries[idx].values.is_empty() {
                entries.remove(idx);
            }
            ((), -1)
        })?;
        let pos = core.pos_seek(&key, vidx)?;
        self.place(&core, pos);
        Ok(())
    }
}
