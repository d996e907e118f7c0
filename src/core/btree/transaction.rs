use ahash::AHashMap;
use bytes::Bytes;
use std::thread::{self, ThreadId};

use crate::core::hash::PutMode;
use crate::error::{Result, ShelfError};

use super::meta::TreeMeta;
use super::node::NodeKey;
use super::tree::TreeCore;

/// State of the active transaction of a tree.
#[derive(Debug)]
pub struct Transaction {
    /// Thread that began the transaction; other threads wait until it ends.
    pub owner: ThreadId,
    /// Pre-transaction image of every node touched, `None` for nodes created since.
    pub undo: AHashMap<NodeKey, Option<Bytes>>,
    pub meta: TreeMeta,
}

impl TreeCore {
    pub fn in_transaction(&self) -> bool {
        self.tran.is_some()
    }

    pub fn transaction_owner(&self) -> Option<ThreadId> {
        self.tran.as_ref().map(|tran| tran.owner)
    }

    pub(super) fn ensure_no_transaction(&self) -> Result<()> {
        if self.tran.is_some() {
            return Err(ShelfError::Invalid("not allowed inside a transaction"));
        }
        Ok(())
    }

    /// Starts a transaction owned by the calling thread.
    pub fn begin(&mut self) -> Result<()> {
        self.ensure_writer()?;
        if self.tran.is_some() {
            return Err(ShelfError::Invalid("transaction already active"));
        }
        self.flush()?;
        self.tran = Some(Transaction {
            owner: thread::current().id(),
            undo: AHashMap::new(),
            meta: self.meta.clone(),
        });
        tracing::debug!(path = %self.hash.path().display(), "transaction begun");
        Ok(())
    }

    /// Makes the transaction's changes durable.
    ///
    /// If writing fails the transaction stays active so it can still be aborted.
    pub fn commit(&mut self) -> Result<()> {
        let tran = self
            .tran
            .take()
            .ok_or(ShelfError::Invalid("no active transaction"))?;
        let pages = tran.undo.len();
        if let Err(e) = self.flush().and_then(|_| self.hash.sync()) {
            self.tran = Some(tran);
            return Err(e);
        }
        tracing::debug!(pages, "transaction committed");
        Ok(())
    }

    /// Restores every node and the metadata to their state at [`begin`](Self::begin).
    pub fn abort(&mut self) -> Result<()> {
        let tran = self
            .tran
            .take()
            .ok_or(ShelfError::Invalid("no active transaction"))?;
        self.forget_pages();
        let pages = tran.undo.len();
        for (key, image) in tran.undo {
            match image {
                Some(image) => {
                    self.hash.put(&key, &image, PutMode::Overwrite)?;
                }
                None => {
                    self.hash.remove(&key)?;
                }
            }
        }
        self.meta = tran.meta;
        self.save_meta()?;
        self.bump();
        tracing::debug!(pages, "transaction aborted");
        Ok(())
    }
}
