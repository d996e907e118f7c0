use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;

use crate::constants::MIN_NODE_CACHE;

use super::node::{inner_key, leaf_key, Inner, Leaf, NodeKey};

/// A tree page that can live in a [`NodeCache`].
pub trait CachedNode {
    fn id(&self) -> u64;
    fn store_key(&self) -> NodeKey;
    fn is_dirty(&self) -> bool;
    fn set_clean(&mut self);
    fn encode(&self) -> Bytes;
}

impl CachedNode for Leaf {
    fn id(&self) -> u64 {
        self.id
    }

    fn store_key(&self) -> NodeKey {
        leaf_key(self.id)
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_clean(&mut self) {
        self.dirty = false;
    }

    fn encode(&self) -> Bytes {
        Leaf::encode(self)
    }
}

impl CachedNode for Inner {
    fn id(&self) -> u64 {
        self.id
    }

    fn store_key(&self) -> NodeKey {
        inner_key(self.id)
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_clean(&mut self) {
        self.dirty = false;
    }

    fn encode(&self) -> Bytes {
        Inner::encode(self)
    }
}

/// LRU set of resident pages of one kind.
///
/// Nodes are moved out with [`take`](Self::take) while being edited and moved
/// back with [`insert`](Self::insert); an insert that pushes out a dirty node
/// hands it back so the caller can write it.
pub struct NodeCache<N: CachedNode> {
    lru: LruCache<u64, N>,
}

impl<N: CachedNode> NodeCache<N> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(MIN_NODE_CACHE)).unwrap_or(NonZeroUsize::MIN);
        Self {
            lru: LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lru.cap().get()
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.lru.contains(&id)
    }

    pub fn get(&mut self, id: u64) -> Option<&N> {
        self.lru.get(&id)
    }

    pub fn take(&mut self, id: u64) -> Option<N> {
        self.lru.pop(&id)
    }

    /// Caches `node`; returns an evicted node that still needs writing.
    pub fn insert(&mut self, node: N) -> Option<N> {
        let id = node.id();
        match self.lru.push(id, node) {
            Some((evicted_id, evicted)) if evicted_id != id && evicted.is_dirty() => Some(evicted),
            _ => None,
        }
    }

    /// Keys and images of every dirty node.
    pub fn dirty_images(&self) -> Vec<(NodeKey, Bytes)> {
        self.lru
            .iter()
            .filter(|(_, node)| node.is_dirty())
            .map(|(_, node)| (node.store_key(), node.encode()))
            .collect()
    }

    pub fn mark_clean(&mut self) {
        for (_, node) in self.lru.iter_mut() {
            node.set_clean();
        }
    }

    pub fn clear(&mut self) {
        self.lru.clear();
    }
}
