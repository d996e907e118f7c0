use bytes::{Bytes, BytesMut};
use std::cmp::Ordering;

use crate::constants::LEAF_SIZE_MAX;
use crate::error::Result;

use super::comparator::Comparator;
use super::node::{Inner, Leaf, LeafEntry};
use super::tree::TreeCore;

/// Inner nodes visited on the way down, with the child index taken at each.
pub(super) type TreePath = Vec<(u64, usize)>;

/// Result of searching a leaf: `Ok(idx)` on a match, `Err(idx)` for the insertion point.
pub(super) type Slot = std::result::Result<usize, usize>;

/// How a put treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreePut {
    /// Replace every value of the key with the new one.
    Overwrite,
    Keep,
    /// Append to the first value.
    Concat,
    /// Add the value after the existing duplicates.
    Dup,
}

/// Bound of a key range; `inclusive` decides whether the key itself qualifies.
#[derive(Debug, Clone, Copy)]
pub struct Bound<'a> {
    pub key: &'a [u8],
    pub inclusive: bool,
}

pub(super) fn search(cmp: &Comparator, entries: &[LeafEntry], key: &[u8]) -> Slot {
    entries.binary_search_by(|entry| cmp.compare(&entry.key, key))
}

/// First index not ordered before `key`, or not at or before it when `strict`.
pub(super) fn lower_bound(cmp: &Comparator, entries: &[LeafEntry], key: &[u8], strict: bool) -> usize {
    entries.partition_point(|entry| match cmp.compare(&entry.key, key) {
        Ordering::Less => true,
        Ordering::Equal => strict,
        Ordering::Greater => false,
    })
}

impl TreeCore {
    /// Walks from the root to the leaf that holds or would hold `key`.
    pub(super) fn descend(&mut self, key: &[u8]) -> Result<(TreePath, u64)> {
        let cmp = self.cmp.clone();
        let mut path = Vec::with_capacity(self.meta.depth as usize);
        let mut id = self.meta.root;
        for _ in 1..self.meta.depth {
            let inner = self.inner_ref(id)?;
            let idx = inner
                .keys
                .partition_point(|sep| cmp.compare(sep, key) != Ordering::Greater);
            let child = inner.children[idx];
            path.push((id, idx));
            id = child;
        }
        Ok((path, id))
    }

    /// Applies `edit` to the leaf owning `key` and rebalances the tree around it.
    ///
    /// `edit` returns its result and the change in stored value count.
    pub(super) fn update<R, F>(&mut self, key: &[u8], edit: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<LeafEntry>, Slot) -> (R, i64),
    {
        self.ensure_writer()?;
        let (path, leaf_id) = self.descend(key)?;
        let mut leaf = self.edit_leaf(leaf_id)?;
        let slot = search(&self.cmp, &leaf.entries, key);
        let (out, delta) = edit(&mut leaf.entries, slot);
        self.meta.rnum = self.meta.rnum.saturating_add_signed(delta);
        self.bump();
        self.settle_leaf(path, leaf)?;
        Ok(out)
    }

    pub fn put(&mut self, key: &[u8], value: &[u8], mode: TreePut) -> Result<bool> {
        self.stats.record_put();
        let key_bytes = Bytes::copy_from_slice(key);
        let value = Bytes::copy_from_slice(value);
        self.update(key, |entries, slot| match (slot, mode) {
            (Ok(_), TreePut::Keep) => (false, 0),
            (Ok(idx), TreePut::Overwrite) => {
                let removed = entries[idx].values.len() as i64;
                entries[idx].values = vec![value];
                (true, 1 - removed)
            }
            (Ok(idx), TreePut::Concat) => {
                let first = &mut entries[idx].values[0];
                let mut joined = BytesMut::with_capacity(first.len() + value.len());
                joined.extend_from_slice(first);
                joined.extend_from_slice(&value);
                *first = joined.freeze();
                (true, 0)
            }
            (Ok(idx), TreePut::Dup) => {
                entries[idx].values.push(value);
                (true, 1)
            }
            (Err(idx), _) => {
                entries.insert(idx, LeafEntry::new(key_bytes, vec![value]));
                (true, 1)
            }
        })
    }

    /// Adds every value in `values` as a duplicate of `key`.
    pub fn putlist(&mut self, key: &[u8], values: &[&[u8]]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let values: Vec<Bytes> = values.iter().map(|v| Bytes::copy_from_slice(v)).collect();
        self.append_values(Bytes::copy_from_slice(key), values)
    }

    pub(super) fn append_values(&mut self, key: Bytes, values: Vec<Bytes>) -> Result<()> {
        self.stats.record_put();
        let count = values.len() as i64;
        self.update(&key.clone(), move |entries, slot| {
            match slot {
                Ok(idx) => entries[idx].values.extend(values),
                Err(idx) => entries.insert(idx, LeafEntry::new(key, values)),
            }
            ((), count)
        })
    }

    /// Removes the first value of `key`; returns whether the key existed.
    pub fn out(&mut self, key: &[u8]) -> Result<bool> {
        self.stats.record_delete();
        self.update(key, |entries, slot| match slot {
            Ok(idx) => {
                entries[idx].values.remove(0);
                if entries[idx].values.is_empty() {
                    entries.remove(idx);
                }
                (true, -1)
            }
            Err(_) => (false, 0),
        })
    }

    /// Removes `key` with all of its values; returns whether the key existed.
    pub fn outlist(&mut self, key: &[u8]) -> Result<bool> {
        self.stats.record_delete();
        self.update(key, |entries, slot| match slot {
            Ok(idx) => {
                let removed = entries.remove(idx);
                (true, -(removed.values.len() as i64))
            }
            Err(_) => (false, 0),
        })
    }

    /// Values of `key` in insertion order; empty when the key is absent.
    pub fn getlist(&mut self, key: &[u8]) -> Result<Vec<Bytes>> {
        self.stats.record_get();
        let (_, leaf_id) = self.descend(key)?;
        let cmp = self.cmp.clone();
        let leaf = self.leaf_ref(leaf_id)?;
        Ok(search(&cmp, &leaf.entries, key)
            .map(|idx| leaf.entries[idx].values.clone())
            .unwrap_or_default())
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.getlist(key)?.into_iter().next())
    }

    pub fn vnum(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.getlist(key)?.len())
    }

    pub fn vsiz(&mut self, key: &[u8]) -> Result<Option<usize>> {
        Ok(self.get(key)?.map(|v| v.len()))
    }

    /// Distinct keys between the bounds in comparator order, at most `max` of them.
    pub fn range(
        &mut self,
        lower: Option<Bound<'_>>,
        upper: Option<Bound<'_>>,
        max: Option<usize>,
    ) -> Result<Vec<Bytes>> {
        self.stats.record_scan();
        let cmp = self.cmp.clone();
        let (leaf_id, idx) = match lower {
            Some(bound) => {
                let (_, leaf_id) = self.descend(bound.key)?;
                let leaf = self.leaf_ref(leaf_id)?;
                (leaf_id, lower_bound(&cmp, &leaf.entries, bound.key, !bound.inclusive))
            }
            None => (self.meta.first, 0),
        };
        self.walk_keys(leaf_id, idx, max, |key| match upper {
            None => Some(true),
            Some(bound) => match cmp.compare(key, bound.key) {
                Ordering::Less => Some(true),
                Ordering::Equal if bound.inclusive => Some(true),
                _ => None,
            },
        })
    }

    /// Keys starting with `prefix`, at most `max` of them.
    pub fn fwmkeys(&mut self, prefix: &[u8], max: Option<usize>) -> Result<Vec<Bytes>> {
        self.stats.record_scan();
        if !self.cmp.is_lexical() {
            let first = self.meta.first;
            return self.walk_keys(first, 0, max, |key| Some(key.starts_with(prefix)));
        }
        let cmp = self.cmp.clone();
        let (_, leaf_id) = self.descend(prefix)?;
        let leaf = self.leaf_ref(leaf_id)?;
        let idx = lower_bound(&cmp, &leaf.entries, prefix, false);
        self.walk_keys(leaf_id, idx, max, |key| key.starts_with(prefix).then_some(true))
    }

    /// Collects keys in order starting at `idx` of `leaf_id`.
    ///
    /// `keep` returns `Some(true)` to take a key, `Some(false)` to skip it and
    /// `None` to stop.
    fn walk_keys<F>(
        &mut self,
        mut leaf_id: u64,
        mut idx: usize,
        max: Option<usize>,
        mut keep: F,
    ) -> Result<Vec<Bytes>>
    where
        F: FnMut(&[u8]) -> Option<bool>,
    {
        let limit = max.unwrap_or(usize::MAX);
        let mut keys = Vec::new();
        if limit == 0 {
            return Ok(keys);
        }
        while leaf_id != 0 {
            let leaf = self.leaf_ref(leaf_id)?;
            for entry in leaf.entries.iter().skip(idx) {
                match keep(&entry.key) {
                    Some(true) => keys.push(entry.key.clone()),
                    Some(false) => {}
                    None => return Ok(keys),
                }
                if keys.len() >= limit {
                    return Ok(keys);
                }
            }
            leaf_id = leaf.next;
            idx = 0;
        }
        Ok(keys)
    }

    /// Calls `f` with every entry in key order until it returns false.
    pub(super) fn for_each_entry<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&LeafEntry) -> Result<bool>,
    {
        let mut leaf_id = self.meta.first;
        while leaf_id != 0 {
            let leaf = self.leaf_ref(leaf_id)?.clone();
            for entry in &leaf.entries {
                if !f(entry)? {
                    return Ok(());
                }
            }
            leaf_id = leaf.next;
        }
        Ok(())
    }

    fn leaf_overflows(&self, leaf: &Leaf) -> bool {
        leaf.entries.len() > self.lmemb()
            || (leaf.entries.len() >= 2 && leaf.size() > LEAF_SIZE_MAX)
    }

    /// Returns an edited leaf to the cache, splitting or rebalancing it first.
    pub(super) fn settle_leaf(&mut self, path: TreePath, leaf: Leaf) -> Result<()> {
        if self.leaf_overflows(&leaf) {
            return self.split_leaf(path, leaf);
        }
        if path.is_empty() || leaf.entries.len() >= self.min_leaf() {
            return self.put_leaf(leaf);
        }
        self.rebalance_leaf(path, leaf)
    }

    fn split_leaf(&mut self, path: TreePath, mut leaf: Leaf) -> Result<()> {
        let mid = leaf.entries.len() / 2;
        let mut right = self.new_leaf()?;
        right.entries = leaf.entries.split_off(mid);
        right.prev = leaf.id;
        right.next = leaf.next;
        if leaf.next == 0 {
            self.meta.last = right.id;
        } else {
            let mut after = self.edit_leaf(leaf.next)?;
            after.prev = right.id;
            self.put_leaf(after)?;
        }
        leaf.next = right.id;

        let separator = right.entries[0].key.clone();
        let (left_id, right_id) = (leaf.id, right.id);
        self.put_leaf(leaf)?;
        self.put_leaf(right)?;
        self.stats.record_split();
        tracing::trace!(leaf = left_id, new = right_id, "split leaf");
        self.insert_separator(path, left_id, separator, right_id)
    }

    /// Links `right` into the parent of `left`, growing a new root when `left` was the root.
    fn insert_separator(
        &mut self,
        mut path: TreePath,
        left: u64,
        separator: Bytes,
        right: u64,
    ) -> Result<()> {
        match path.pop() {
            None => {
                let root = self.new_inner(vec![separator], vec![left, right])?;
                self.meta.root = root.id;
                self.meta.depth += 1;
                tracing::trace!(root = root.id, depth = self.meta.depth, "tree grew a level");
                self.put_inner(root)
            }
            Some((parent_id, idx)) => {
                let mut parent = self.edit_inner(parent_id)?;
                parent.keys.insert(idx, separator);
                parent.children.insert(idx + 1, right);
                if parent.keys.len() > self.nmemb() {
                    self.split_inner(path, parent)
                } else {
                    self.put_inner(parent)
                }
            }
        }
    }

    fn split_inner(&mut self, path: TreePath, mut inner: Inner) -> Result<()> {
        let mid = inner.keys.len() / 2;
        let mut right_keys = inner.keys.split_off(mid);
        let promoted = right_keys.remove(0);
        let right_children = inner.children.split_off(mid + 1);
        let right = self.new_inner(right_keys, right_children)?;

        let (left_id, right_id) = (inner.id, right.id);
        self.put_inner(inner)?;
        self.put_inner(right)?;
        self.stats.record_split();
        tracing::trace!(node = left_id, new = right_id, "split inner node");
        self.insert_separator(path, left_id, promoted, right_id)
    }

    /// Refills an underfull leaf from a sibling under the same parent, or merges with it.
    fn rebalance_leaf(&mut self, mut path: TreePath, mut leaf: Leaf) -> Result<()> {
        let Some((parent_id, idx)) = path.pop() else {
            return self.put_leaf(leaf);
        };
        let parent = self.inner_ref(parent_id)?;
        let left_id = idx.checked_sub(1).map(|i| parent.children[i]);
        let right_id = parent.children.get(idx + 1).copied();
        let min = self.min_leaf();

        let left_len = match left_id {
            Some(id) => self.leaf_ref(id)?.entries.len(),
            None => 0,
        };
        let right_len = match right_id {
            Some(id) => self.leaf_ref(id)?.entries.len(),
            None => 0,
        };

        if let (Some(id), true) = (left_id, left_len > min) {
            let mut left = self.edit_leaf(id)?;
            let mut parent = self.edit_inner(parent_id)?;
            if let Some(moved) = left.entries.pop() {
                parent.keys[idx - 1] = moved.key.clone();
                leaf.entries.insert(0, moved);
            }
            self.put_leaf(left)?;
            self.put_leaf(leaf)?;
            return self.put_inner(parent);
        }

        if let (Some(id), true) = (right_id, right_len > min) {
            let mut right = self.edit_leaf(id)?;
            let mut parent = self.edit_inner(parent_id)?;
            let moved = right.entries.remove(0);
            leaf.entries.push(moved);
            parent.keys[idx] = right.entries[0].key.clone();
            self.put_leaf(right)?;
            self.put_leaf(leaf)?;
            return self.put_inner(parent);
        }

        match (left_id, right_id) {
            (Some(id), _) => {
                let left = self.edit_leaf(id)?;
                if !self.mergeable(&left, &leaf) {
                    self.put_leaf(left)?;
                    return self.put_leaf(leaf);
                }
                self.merge_leaves(path, parent_id, idx - 1, left, leaf)
            }
            (None, Some(id)) => {
                let right = self.edit_leaf(id)?;
                if !self.mergeable(&leaf, &right) {
                    self.put_leaf(right)?;
                    return self.put_leaf(leaf);
                }
                self.merge_leaves(path, parent_id, idx, leaf, right)
            }
            (None, None) => self.put_leaf(leaf),
        }
    }

    fn mergeable(&self, left: &Leaf, right: &Leaf) -> bool {
        left.entries.is_empty()
            || right.entries.is_empty()
            || (left.entries.len() + right.entries.len() <= self.lmemb()
                && left.size() + right.size() <= LEAF_SIZE_MAX)
    }

    /// Folds `right` into `left` and drops separator `sep` from the parent.
    fn merge_leaves(
        &mut self,
        path: TreePath,
        parent_id: u64,
        sep: usize,
        mut left: Leaf,
        mut right: Leaf,
    ) -> Result<()> {
        left.entries.append(&mut right.entries);
        left.next = right.next;
        if right.next == 0 {
            self.meta.last = left.id;
        } else {
            let mut after = self.edit_leaf(right.next)?;
            after.prev = left.id;
            self.put_leaf(after)?;
        }
        let mut parent = self.edit_inner(parent_id)?;
        parent.keys.remove(sep);
        parent.children.remove(sep + 1);

        let (left_id, right_id) = (left.id, right.id);
        self.put_leaf(left)?;
        self.discard_leaf(right_id)?;
        self.stats.record_merge();
        tracing::trace!(leaf = left_id, removed = right_id, "merged leaves");
        self.settle_inner(path, parent)
    }

    /// Returns an edited inner node to the cache, collapsing or rebalancing as needed.
    fn settle_inner(&mut self, path: TreePath, inner: Inner) -> Result<()> {
        if path.is_empty() {
            if inner.keys.is_empty() {
                let child = inner.children[0];
                self.discard_inner(inner.id)?;
                self.meta.root = child;
                self.meta.depth -= 1;
                tracing::trace!(root = child, depth = self.meta.depth, "tree lost a level");
                return Ok(());
            }
            return self.put_inner(inner);
        }
        if inner.keys.len() >= self.min_inner() {
            return self.put_inner(inner);
        }
        self.rebalance_inner(path, inner)
    }

    fn rebalance_inner(&mut self, mut path: TreePath, mut inner: Inner) -> Result<()> {
        let Some((parent_id, idx)) = path.pop() else {
            return self.put_inner(inner);
        };
        let parent = self.inner_ref(parent_id)?;
        let left_id = idx.checked_sub(1).map(|i| parent.children[i]);
        let right_id = parent.children.get(idx + 1).copied();
        let min = self.min_inner();

        let left_len = match left_id {
            Some(id) => self.inner_ref(id)?.keys.len(),
            None => 0,
        };
        let right_len = match right_id {
            Some(id) => self.inner_ref(id)?.keys.len(),
            None => 0,
        };

        let mut parent = self.edit_inner(parent_id)?;

        if let (Some(id), true) = (left_id, left_len > min) {
            let mut left = self.edit_inner(id)?;
            if let (Some(key), Some(child)) = (left.keys.pop(), left.children.pop()) {
                let down = std::mem::replace(&mut parent.keys[idx - 1], key);
                inner.keys.insert(0, down);
                inner.children.insert(0, child);
            }
            self.put_inner(left)?;
            self.put_inner(inner)?;
            return self.put_inner(parent);
        }

        if let (Some(id), true) = (right_id, right_len > min) {
            let mut right = self.edit_inner(id)?;
            let key = right.keys.remove(0);
            let child = right.children.remove(0);
            let down = std::mem::replace(&mut parent.keys[idx], key);
            inner.keys.push(down);
            inner.children.push(child);
            self.put_inner(right)?;
            self.put_inner(inner)?;
            return self.put_inner(parent);
        }

        let (mut left, right, sep) = match (left_id, right_id) {
            (Some(id), _) => (self.edit_inner(id)?, inner, idx - 1),
            (None, Some(id)) => {
                let right = self.edit_inner(id)?;
                (inner, right, idx)
            }
            (None, None) => {
                self.put_inner(inner)?;
                return self.settle_inner(path, parent);
            }
        };
        left.keys.push(parent.keys.remove(sep));
        left.keys.extend(right.keys);
        left.children.extend(right.children);
        parent.children.remove(sep + 1);

        let (left_id, right_id) = (left.id, right.id);
        self.put_inner(left)?;
        self.discard_inner(right_id)?;
        self.stats.record_merge();
        tracing::trace!(node = left_id, removed = right_id, "merged inner nodes");
        self.settle_inner(path, parent)
    }
}
