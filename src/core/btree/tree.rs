use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

use crate::constants::EngineKind;
use crate::core::hash::{HashCore, PutMode};
use crate::core::options::{BTreeTuning, OpenMode};
use crate::error::{Result, ShelfError};
use crate::stats::Statistics;

use super::comparator::Comparator;
use super::meta::TreeMeta;
use super::node::{inner_key, leaf_key, Inner, Leaf, NodeKey};
use super::node_cache::NodeCache;
use super::transaction::Transaction;

/// B+tree whose pages are records of an inner [`HashCore`].
///
/// Pages are cached in two LRU sets (leaves and inner nodes); edits mark a
/// page dirty and it is written back on eviction, sync, commit or close.
/// Not synchronized; [`BTreeDb`](super::BTreeDb) serializes access.
pub struct TreeCore {
    pub(super) hash: HashCore,
    pub(super) meta: TreeMeta,
    pub(super) cmp: Comparator,
    leaves: NodeCache<Leaf>,
    inners: NodeCache<Inner>,
    /// Bumped by every mutation; cursors compare it to detect stale positions.
    pub(super) epoch: u64,
    pub(super) tran: Option<Transaction>,
    pub(super) stats: Arc<Statistics>,
    closed: bool,
}

impl TreeCore {
    pub fn open(
        path: &Path,
        mode: OpenMode,
        tuning: BTreeTuning,
        cmp: Comparator,
        cache: (usize, usize),
        stats: Arc<Statistics>,
    ) -> Result<Self> {
        cmp.validate()?;
        let tuning = tuning.normalized();
        let hash = HashCore::open(
            path,
            mode,
            EngineKind::BTree,
            tuning.hash_tuning(),
            0,
            stats.clone(),
        )?;
        Self::attach(hash, cmp, tuning, cache)
    }

    /// Builds the tree over an opened node store, laying out an empty tree if needed.
    pub fn attach(
        hash: HashCore,
        cmp: Comparator,
        tuning: BTreeTuning,
        cache: (usize, usize),
    ) -> Result<Self> {
        let meta = TreeMeta::decode(&hash.store().header().opaque)?;
        let stats = hash.stats().clone();
        let mut tree = Self {
            hash,
            meta,
            cmp: Comparator::Lexical,
            leaves: NodeCache::new(cache.0),
            inners: NodeCache::new(cache.1),
            epoch: 0,
            tran: None,
            stats,
            closed: false,
        };

        if tree.meta.is_blank() {
            if !tree.hash.store().is_writer() {
                return Err(ShelfError::Meta("tree has not been initialized"));
            }
            tree.meta = TreeMeta {
                cmp_tag: cmp.tag(),
                lmemb: tuning.lmemb as u32,
                nmemb: tuning.nmemb as u32,
                next_id: 1,
                cmp_name: cmp.name().to_string(),
                ..TreeMeta::default()
            };
            tree.cmp = cmp;
            tree.lay_out_root()?;
        } else {
            tree.cmp = cmp.reconcile(tree.meta.cmp_tag, &tree.meta.cmp_name)?;
        }
        Ok(tree)
    }

    /// Starts an empty tree: one empty leaf that is both root and only leaf.
    pub(super) fn lay_out_root(&mut self) -> Result<()> {
        let id = self.meta.alloc_id();
        self.log_undo(leaf_key(id))?;
        self.meta.root = id;
        self.meta.first = id;
        self.meta.last = id;
        self.meta.depth = 1;
        self.meta.rnum = 0;
        self.put_leaf(Leaf::new(id))?;
        self.flush()
    }

    pub fn rnum(&self) -> u64 {
        self.meta.rnum
    }

    pub fn fsiz(&self) -> u64 {
        self.hash.fsiz()
    }

    pub fn lmemb(&self) -> usize {
        self.meta.lmemb as usize
    }

    pub fn nmemb(&self) -> usize {
        self.meta.nmemb as usize
    }

    pub(super) fn min_leaf(&self) -> usize {
        self.lmemb() / 2
    }

    pub(super) fn min_inner(&self) -> usize {
        self.nmemb() / 2
    }

    pub fn cache_sizes(&self) -> (usize, usize) {
        (self.leaves.capacity(), self.inners.capacity())
    }

    pub fn cached_nodes(&self) -> (usize, usize) {
        (self.leaves.len(), self.inners.len())
    }

    pub(super) fn bump(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub(super) fn ensure_writer(&self) -> Result<()> {
        self.hash.store().ensure_writer()
    }

    fn read_node(&mut self, key: &NodeKey) -> Result<Bytes> {
        self.hash
            .get(key)?
            .ok_or(ShelfError::Meta("tree references a missing node"))
    }

    pub(super) fn take_leaf(&mut self, id: u64) -> Result<Leaf> {
        if let Some(leaf) = self.leaves.take(id) {
            self.stats.record_cache(true);
            return Ok(leaf);
        }
        self.stats.record_cache(false);
        let raw = self.read_node(&leaf_key(id))?;
        Leaf::decode(&raw)
    }

    pub(super) fn take_inner(&mut self, id: u64) -> Result<Inner> {
        if let Some(inner) = self.inners.take(id) {
            self.stats.record_cache(true);
            return Ok(inner);
        }
        self.stats.record_cache(false);
        let raw = self.read_node(&inner_key(id))?;
        Inner::decode(&raw)
    }

    pub(super) fn put_leaf(&mut self, leaf: Leaf) -> Result<()> {
        if let Some(evicted) = self.leaves.insert(leaf) {
            self.stats.record_eviction(1);
            tracing::trace!(leaf = evicted.id, "writing back evicted leaf");
            self.hash
                .put(&leaf_key(evicted.id), &evicted.encode(), PutMode::Overwrite)?;
        }
        Ok(())
    }

    pub(super) fn put_inner(&mut self, inner: Inner) -> Result<()> {
        if let Some(evicted) = self.inners.insert(inner) {
            self.stats.record_eviction(1);
            tracing::trace!(node = evicted.id, "writing back evicted inner node");
            self.hash
                .put(&inner_key(evicted.id), &evicted.encode(), PutMode::Overwrite)?;
        }
        Ok(())
    }

    /// Read access to a leaf, loading it into the cache on a miss.
    pub(super) fn leaf_ref(&mut self, id: u64) -> Result<&Leaf> {
        if !self.leaves.contains(id) {
            let leaf = self.take_leaf(id)?;
            self.put_leaf(leaf)?;
        }
        self.leaves
            .get(id)
            .ok_or(ShelfError::Misc(format!("leaf {id} left the cache")))
    }

    pub(super) fn inner_ref(&mut self, id: u64) -> Result<&Inner> {
        if !self.inners.contains(id) {
            let inner = self.take_inner(id)?;
            self.put_inner(inner)?;
        }
        self.inners
            .get(id)
            .ok_or(ShelfError::Misc(format!("inner node {id} left the cache")))
    }

    /// Records the pre-transaction image of a node the first time it is touched.
    pub(super) fn log_undo(&mut self, key: NodeKey) -> Result<()> {
        let needs_image = match &self.tran {
            Some(tran) => !tran.undo.contains_key(&key),
            None => false,
        };
        if needs_image {
            let image = self.hash.get(&key)?;
            if let Some(tran) = self.tran.as_mut() {
                tran.undo.insert(key, image);
            }
        }
        Ok(())
    }

    /// Takes a leaf out of the cache for editing and marks it dirty.
    pub(super) fn edit_leaf(&mut self, id: u64) -> Result<Leaf> {
        self.log_undo(leaf_key(id))?;
        let mut leaf = self.take_leaf(id)?;
        leaf.dirty = true;
        Ok(leaf)
    }

    pub(super) fn edit_inner(&mut self, id: u64) -> Result<Inner> {
        self.log_undo(inner_key(id))?;
        let mut inner = self.take_inner(id)?;
        inner.dirty = true;
        Ok(inner)
    }

    pub(super) fn new_leaf(&mut self) -> Result<Leaf> {
        let id = self.meta.alloc_id();
        self.log_undo(leaf_key(id))?;
        Ok(Leaf::new(id))
    }

    pub(super) fn new_inner(&mut self, keys: Vec<Bytes>, children: Vec<u64>) -> Result<Inner> {
        let id = self.meta.alloc_id();
        self.log_undo(inner_key(id))?;
        Ok(Inner::new(id, keys, children))
    }

    /// Deletes a leaf that has already been taken out of the cache.
    pub(super) fn discard_leaf(&mut self, id: u64) -> Result<()> {
        let key = leaf_key(id);
        self.log_undo(key)?;
        self.leaves.take(id);
        self.hash.remove(&key)?;
        Ok(())
    }

    pub(super) fn discard_inner(&mut self, id: u64) -> Result<()> {
        let key = inner_key(id);
        self.log_undo(key)?;
        self.inners.take(id);
        self.hash.remove(&key)?;
        Ok(())
    }

    /// Writes every dirty page back to the node store.
    pub(super) fn flush_nodes(&mut self) -> Result<()> {
        let mut images = self.leaves.dirty_images();
        images.extend(self.inners.dirty_images());
        if images.is_empty() {
            return Ok(());
        }
        tracing::trace!(pages = images.len(), "flushing dirty pages");
        for (key, image) in &images {
            self.hash.put(key, image, PutMode::Overwrite)?;
        }
        self.leaves.mark_clean();
        self.inners.mark_clean();
        Ok(())
    }

    /// Writes the tree metadata into the file header.
    pub(super) fn save_meta(&mut self) -> Result<()> {
        if !self.hash.store().is_writer() {
            return Ok(());
        }
        let encoded = self.meta.encode();
        let store = self.hash.store_mut();
        store.header_mut().opaque = encoded;
        store.write_header()
    }

    pub(super) fn flush(&mut self) -> Result<()> {
        self.flush_nodes()?;
        self.save_meta()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.ensure_writer()?;
        self.flush()?;
        self.hash.sync()
    }

    /// Drops every record and starts over with an empty tree.
    pub fn vanish(&mut self) -> Result<()> {
        self.ensure_writer()?;
        self.forget_pages();
        self.hash.vanish()?;
        self.meta = TreeMeta {
            cmp_tag: self.meta.cmp_tag,
            lmemb: self.meta.lmemb,
            nmemb: self.meta.nmemb,
            next_id: 1,
            cmp_name: std::mem::take(&mut self.meta.cmp_name),
            ..TreeMeta::default()
        };
        self.lay_out_root()?;
        self.bump();
        Ok(())
    }

    /// Drops every cached page without writing it.
    pub(super) fn forget_pages(&mut self) {
        self.leaves.clear();
        self.inners.clear();
    }

    /// Persists and closes the node store; an active transaction is aborted.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.tran.is_some() {
            tracing::debug!("aborting transaction left open at close");
            self.abort()?;
        }
        if self.hash.store().is_writer() {
            self.flush()?;
        }
        self.hash.shutdown()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flushes and hands back the node store, for rebuilds.
    pub(super) fn into_hash(mut self) -> Result<HashCore> {
        self.flush()?;
        Ok(self.hash)
    }
}
