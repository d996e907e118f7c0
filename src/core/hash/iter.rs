use bytes::Bytes;

use crate::error::Result;

use super::{HashDb, IterPos};

/// Pass over the `(key, value)` pairs of a [`HashDb`] in bucket-then-chain order.
///
/// The connection lock is taken per step, so other calls may interleave; a
/// record written during the pass may or may not be visited.
pub struct HashIter<'a> {
    db: &'a HashDb,
    pos: Option<IterPos>,
    started: bool,
}

impl<'a> HashIter<'a> {
    pub(super) fn new(db: &'a HashDb) -> Self {
        Self {
            db,
            pos: None,
            started: false,
        }
    }
}

impl Iterator for HashIter<'_> {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut core = self.db.core.lock();
        if let Err(e) = core.flush_async() {
            self.started = true;
            self.pos = None;
            return Some(Err(e));
        }
        if !self.started {
            self.started = true;
            self.pos = Some(core.first_pos());
        }
        let pos = self.pos?;
        match core.record_at(pos) {
            Ok(Some((key, value, next))) => {
                self.pos = Some(next);
                Some(Ok((key, value)))
            }
            Ok(None) => {
                self.pos = None;
                None
            }
            Err(e) => {
                self.pos = None;
                Some(Err(e))
            }
        }
    }
}
