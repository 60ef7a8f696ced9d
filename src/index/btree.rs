use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{Result, HEADER_PAGE_ID};
use crate::storage::header_page::{HeaderPageMut, HeaderPageView};

use super::btree_page::{
    page_type, BTreePageType, InternalPageMut, InternalPageView, LeafPageMut, LeafPageView,
};
use super::{default_comparator, BTreeIterator, KeyComparator};

/// Write guards collected while descending from the header page. The
/// header guard and every ancestor write guard still held are released
/// together once a node proves "safe" (won't split or underflow), per the
/// safe-ancestor-release discipline.
struct Context {
    header_guard: Option<WritePageGuard>,
    write_set: VecDeque<WritePageGuard>,
}

/// Disk-resident B+ tree keyed by `KEY_SIZE`-byte keys mapping to
/// `VALUE_SIZE`-byte opaque payloads, with unique keys and ordered
/// iteration. The current root id lives in the shared header page rather
/// than in any in-memory field, so any number of `BTreeIndex` handles over
/// the same pool observe the same tree.
pub struct BTreeIndex<const KEY_SIZE: usize, const VALUE_SIZE: usize> {
    bpm: Arc<BufferPoolManager>,
    comparator: Box<dyn KeyComparator>,
    leaf_max_size: u16,
    internal_max_size: u16,
}

impl<const KEY_SIZE: usize, const VALUE_SIZE: usize> BTreeIndex<KEY_SIZE, VALUE_SIZE> {
    /// Builds a tree whose comparator is picked from `KEY_SIZE`: see
    /// [`default_comparator`]. Use [`Self::with_comparator`] when the key
    /// layout needs an ordering other than the width-based default.
    pub fn new(bpm: Arc<BufferPoolManager>, leaf_max_size: u16, internal_max_size: u16) -> Self {
        Self::with_comparator(bpm, default_comparator(KEY_SIZE), leaf_max_size, internal_max_size)
    }

    pub fn with_comparator(
        bpm: Arc<BufferPoolManager>,
        comparator: Box<dyn KeyComparator>,
        leaf_max_size: u16,
        internal_max_size: u16,
    ) -> Self {
        Self {
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    /// The tree's current root, or `PageId::INVALID` if it holds no keys.
    pub fn root_page_id(&self) -> Result<crate::common::PageId> {
        let header_guard = self.bpm.fetch_read(HEADER_PAGE_ID)?;
        Ok(HeaderPageView::new(header_guard.data()).root_page_id())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(!self.root_page_id()?.is_valid())
    }

    /// Looks up `key`, descending with read-latch crabbing (never more than
    /// two read guards held at once).
    pub fn get_value(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        debug_assert_eq!(key.len(), KEY_SIZE);

        let root_page_id = self.root_page_id()?;
        if !root_page_id.is_valid() {
            return Ok(None);
        }

        let mut current = self.bpm.fetch_read(root_page_id)?;
        loop {
            match page_type(current.data()) {
                BTreePageType::Internal => {
                    let child_id =
                        InternalPageView::<KEY_SIZE>::new(current.data())
                            .child_for_key(key, self.comparator.as_ref());
                    current = self.bpm.fetch_read(child_id)?;
                }
                BTreePageType::Leaf => {
                    let leaf = LeafPageView::<KEY_SIZE, VALUE_SIZE>::new(current.data());
                    let idx = leaf.lower_bound(key, self.comparator.as_ref());
                    if idx < leaf.size() as usize
                        && self.comparator.compare(leaf.key_at(idx), key) == Ordering::Equal
                    {
                        return Ok(Some(leaf.value_at(idx).to_vec()));
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Inserts `(key, value)`. Returns `false` without modifying the tree
    /// if `key` is already present.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        debug_assert_eq!(key.len(), KEY_SIZE);
        debug_assert_eq!(value.len(), VALUE_SIZE);

        let mut ctx = Context {
            header_guard: Some(self.bpm.fetch_write(HEADER_PAGE_ID)?),
            write_set: VecDeque::new(),
        };
        let root_page_id =
            HeaderPageView::new(ctx.header_guard.as_ref().unwrap().data()).root_page_id();

        if !root_page_id.is_valid() {
            let (new_root_id, mut guard) = self.bpm.new_page_guarded()?;
            {
                let data = &mut guard.data_mut()[..];
                let mut leaf = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(data);
                leaf.init(self.leaf_max_size);
                leaf.write_entries(&[(key.to_vec(), value.to_vec())]);
            }
            drop(guard);
            HeaderPageMut::new(ctx.header_guard.as_mut().unwrap().data_mut())
                .set_root_page_id(new_root_id);
            return Ok(true);
        }

        let mut current = self.bpm.fetch_write(root_page_id)?;
        loop {
            let (is_leaf, has_room) = {
                let data = current.data();
                match page_type(data) {
                    BTreePageType::Leaf => {
                        let view = LeafPageView::<KEY_SIZE, VALUE_SIZE>::new(data);
                        (true, view.size() < view.max_size())
                    }
                    BTreePageType::Internal => {
                        let view = InternalPageView::<KEY_SIZE>::new(data);
                        (false, view.size() < view.max_size())
                    }
                }
            };

            if has_room {
                ctx.write_set.clear();
                ctx.header_guard = None;
            }

            if is_leaf {
                ctx.write_set.push_back(current);
                break;
            }

            let child_id = InternalPageView::<KEY_SIZE>::new(current.data())
                .child_for_key(key, self.comparator.as_ref());
            ctx.write_set.push_back(current);
            current = self.bpm.fetch_write(child_id)?;
        }

        let mut leaf_guard = ctx.write_set.pop_back().expect("descent visits a leaf");
        let leaf_page_id = leaf_guard.page_id();

        let (duplicate, mut entries, idx) = {
            let leaf = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut());
            let idx = leaf.as_view().lower_bound(key, self.comparator.as_ref());
            let duplicate = idx < leaf.size() as usize
                && self.comparator.compare(leaf.key_at(idx), key) == Ordering::Equal;
            (duplicate, leaf.entries(), idx)
        };

        if duplicate {
            return Ok(false);
        }
        entries.insert(idx, (key.to_vec(), value.to_vec()));

        if entries.len() <= self.leaf_max_size as usize {
            LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut()).write_entries(&entries);
            return Ok(true);
        }

        // Leaf overflowed: split so the left keeps the smaller, ceil-rounded
        // half and link the new right leaf into the chain.
        let left_count = entries.len().div_ceil(2);
        let left_entries = entries[..left_count].to_vec();
        let right_entries = entries[left_count..].to_vec();
        let separator = right_entries[0].0.clone();

        let (new_leaf_id, mut new_leaf_guard) = self.bpm.new_page_guarded()?;
        {
            let old_next = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut())
                .next_page_id();
            let new_leaf_data = &mut new_leaf_guard.data_mut()[..];
            let mut new_leaf = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(new_leaf_data);
            new_leaf.init(self.leaf_max_size);
            new_leaf.write_entries(&right_entries);
            new_leaf.set_next_page_id(old_next);
        }
        drop(new_leaf_guard);

        {
            let mut leaf = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut());
            leaf.write_entries(&left_entries);
            leaf.set_next_page_id(new_leaf_id);
        }
        drop(leaf_guard);

        self.propagate_split(&mut ctx, leaf_page_id, new_leaf_id, separator)?;
        Ok(true)
    }

    /// Inserts `(separator, new_child)` into the parent of `left_child`,
    /// splitting internal pages and growing a new root as the propagation
    /// cascades upward.
    fn propagate_split(
        &self,
        ctx: &mut Context,
        mut left_child: crate::common::PageId,
        mut new_child: crate::common::PageId,
        mut separator: Vec<u8>,
    ) -> Result<()> {
        loop {
            let Some(mut parent_guard) = ctx.write_set.pop_back() else {
                let (new_root_id, mut guard) = self.bpm.new_page_guarded()?;
                InternalPageMut::<KEY_SIZE>::new(&mut guard.data_mut()[..]).init_as_root(
                    self.internal_max_size,
                    left_child,
                    &separator,
                    new_child,
                );
                drop(guard);
                HeaderPageMut::new(ctx.header_guard.as_mut().expect("header guard held").data_mut())
                    .set_root_page_id(new_root_id);
                return Ok(());
            };

            let parent_page_id = parent_guard.page_id();
            let mut parent = InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut());
            let pos = parent
                .index_of_child(left_child)
                .expect("parent must reference its just-split child");
            let (first_child, mut rest) = parent.entries();
            rest.insert(pos, (separator.clone(), new_child));

            if rest.len() + 1 <= self.internal_max_size as usize {
                parent.write_entries(first_child, &rest);
                return Ok(());
            }

            let full_size = rest.len() + 1;
            let left_count = full_size.div_ceil(2);
            let left_rest = rest[..left_count - 1].to_vec();
            let hoisted_key = rest[left_count - 1].0.clone();
            let right_first_child = rest[left_count - 1].1;
            let right_rest = rest[left_count..].to_vec();

            parent.write_entries(first_child, &left_rest);
            drop(parent_guard);

            let (right_page_id, mut right_guard) = self.bpm.new_page_guarded()?;
            {
                let right_data = &mut right_guard.data_mut()[..];
                let mut right_page = InternalPageMut::<KEY_SIZE>::new(right_data);
                right_page.init(self.internal_max_size);
                right_page.write_entries(right_first_child, &right_rest);
            }
            drop(right_guard);

            left_child = parent_page_id;
            new_child = right_page_id;
            separator = hoisted_key;
        }
    }

    /// Removes `key`. Returns `false` if it wasn't present.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        debug_assert_eq!(key.len(), KEY_SIZE);

        let mut ctx = Context {
            header_guard: Some(self.bpm.fetch_write(HEADER_PAGE_ID)?),
            write_set: VecDeque::new(),
        };
        let root_page_id =
            HeaderPageView::new(ctx.header_guard.as_ref().unwrap().data()).root_page_id();
        if !root_page_id.is_valid() {
            return Ok(false);
        }

        let mut current = self.bpm.fetch_write(root_page_id)?;
        loop {
            let is_root = ctx.write_set.is_empty();
            let (is_leaf, safe) = {
                let data = current.data();
                match page_type(data) {
                    BTreePageType::Leaf => {
                        let view = LeafPageView::<KEY_SIZE, VALUE_SIZE>::new(data);
                        let floor = if is_root { 1 } else { view.min_size() };
                        (true, view.size() > floor)
                    }
                    BTreePageType::Internal => {
                        let view = InternalPageView::<KEY_SIZE>::new(data);
                        let floor = if is_root { 2 } else { view.min_size() };
                        (false, view.size() > floor)
                    }
                }
            };

            if safe {
                ctx.write_set.clear();
                ctx.header_guard = None;
            }

            if is_leaf {
                ctx.write_set.push_back(current);
                break;
            }

            let child_id = InternalPageView::<KEY_SIZE>::new(current.data())
                .child_for_key(key, self.comparator.as_ref());
            ctx.write_set.push_back(current);
            current = self.bpm.fetch_write(child_id)?;
        }

        let mut leaf_guard = ctx.write_set.pop_back().expect("descent visits a leaf");
        let leaf_page_id = leaf_guard.page_id();
        let is_root = ctx.write_set.is_empty();

        let mut entries = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut()).entries();
        let idx = {
            let leaf = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut());
            leaf.as_view().lower_bound(key, self.comparator.as_ref())
        };
        if idx >= entries.len() || self.comparator.compare(&entries[idx].0, key) != Ordering::Equal
        {
            return Ok(false);
        }
        entries.remove(idx);

        if is_root {
            if entries.is_empty() {
                drop(leaf_guard);
                self.bpm.delete_page(leaf_page_id)?;
                HeaderPageMut::new(ctx.header_guard.as_mut().expect("header guard held").data_mut())
                    .set_root_page_id(crate::common::PageId::INVALID);
            } else {
                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut())
                    .write_entries(&entries);
            }
            return Ok(true);
        }

        let min_size = min_leaf_size(self.leaf_max_size);
        if entries.len() >= min_size as usize {
            LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut()).write_entries(&entries);
            return Ok(true);
        }

        self.rebalance_leaf(&mut ctx, leaf_guard, leaf_page_id, entries)
    }

    /// Rebalances an underflowed leaf by borrowing from a sibling, or
    /// merging with one and propagating the separator removal upward.
    fn rebalance_leaf(
        &self,
        ctx: &mut Context,
        mut leaf_guard: WritePageGuard,
        leaf_page_id: crate::common::PageId,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<bool> {
        let mut parent_guard = ctx.write_set.pop_back().expect("non-root leaf has a parent");
        let (first_child, rest) = InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut()).entries();
        let child_index = InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut())
            .index_of_child(leaf_page_id)
            .expect("parent must reference the underflowed leaf");

        if child_index > 0 {
            let left_id = if child_index == 1 {
                first_child
            } else {
                rest[child_index - 2].1
            };
            let mut left_guard = self.bpm.fetch_write(left_id)?;
            let mut left_entries =
                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(left_guard.data_mut()).entries();
            let left_min = min_leaf_size(self.leaf_max_size) as usize;

            if left_entries.len() > left_min {
                let borrowed = left_entries.pop().unwrap();
                let mut new_entries = entries;
                new_entries.insert(0, borrowed);
                let new_key = new_entries[0].0.clone();

                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(left_guard.data_mut())
                    .write_entries(&left_entries);
                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut())
                    .write_entries(&new_entries);

                let mut new_rest = rest;
                new_rest[child_index - 1].0 = new_key;
                InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut())
                    .write_entries(first_child, &new_rest);
                return Ok(true);
            }
        }

        if child_index < rest.len() {
            let right_id = rest[child_index].1;
            let mut right_guard = self.bpm.fetch_write(right_id)?;
            let mut right_entries =
                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(right_guard.data_mut()).entries();
            let right_min = min_leaf_size(self.leaf_max_size) as usize;

            if right_entries.len() > right_min {
                let borrowed = right_entries.remove(0);
                let mut new_entries = entries;
                new_entries.push(borrowed);
                let new_key = right_entries[0].0.clone();

                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(right_guard.data_mut())
                    .write_entries(&right_entries);
                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut())
                    .write_entries(&new_entries);

                let mut new_rest = rest;
                new_rest[child_index].0 = new_key;
                InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut())
                    .write_entries(first_child, &new_rest);
                return Ok(true);
            }
        }

        if child_index > 0 {
            let left_id = if child_index == 1 {
                first_child
            } else {
                rest[child_index - 2].1
            };
            let mut left_guard = self.bpm.fetch_write(left_id)?;
            let next_after_leaf = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut())
                .next_page_id();
            {
                let mut left = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(left_guard.data_mut());
                let mut left_entries = left.entries();
                left_entries.extend(entries);
                left.write_entries(&left_entries);
                left.set_next_page_id(next_after_leaf);
            }
            drop(left_guard);
            drop(leaf_guard);
            self.bpm.delete_page(leaf_page_id)?;

            ctx.write_set.push_back(parent_guard);
            return self.remove_child_from_parent(ctx, leaf_page_id);
        }

        debug_assert!(child_index < rest.len(), "leaf has no sibling to merge with");
        let right_id = rest[child_index].1;
        let mut right_guard = self.bpm.fetch_write(right_id)?;
        let next_after_right =
            LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(right_guard.data_mut()).next_page_id();
        {
            let right_entries =
                LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(right_guard.data_mut()).entries();
            let mut leaf = LeafPageMut::<KEY_SIZE, VALUE_SIZE>::new(leaf_guard.data_mut());
            let mut merged = entries;
            merged.extend(right_entries);
            leaf.write_entries(&merged);
            leaf.set_next_page_id(next_after_right);
        }
        drop(right_guard);
        drop(leaf_guard);
        self.bpm.delete_page(right_id)?;

        ctx.write_set.push_back(parent_guard);
        self.remove_child_from_parent(ctx, right_id)
    }

    /// Removes the slot referencing `removed_child` from the parent now on
    /// top of `ctx.write_set`, then rebalances that parent if it
    /// underflows, cascading up to a possible root collapse.
    fn remove_child_from_parent(
        &self,
        ctx: &mut Context,
        mut removed_child: crate::common::PageId,
    ) -> Result<bool> {
        loop {
            let mut parent_guard = ctx
                .write_set
                .pop_back()
                .expect("a merge always has a parent holding the removed child");
            let parent_page_id = parent_guard.page_id();
            let is_root = ctx.write_set.is_empty();

            let (first_child, mut rest) =
                InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut()).entries();
            let removed_index = rest
                .iter()
                .position(|(_, child)| *child == removed_child)
                .expect("parent must reference the removed child");
            rest.remove(removed_index);
            InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut())
                .write_entries(first_child, &rest);

            let new_size = rest.len() + 1;

            if is_root {
                if new_size == 1 {
                    drop(parent_guard);
                    self.bpm.delete_page(parent_page_id)?;
                    HeaderPageMut::new(
                        ctx.header_guard.as_mut().expect("header guard held").data_mut(),
                    )
                    .set_root_page_id(first_child);
                }
                return Ok(true);
            }

            let min_size = min_internal_size(self.internal_max_size);
            if new_size >= min_size as usize {
                return Ok(true);
            }

            let mut grandparent_guard = ctx.write_set.pop_back().expect("non-root has a parent");
            let (gp_first_child, gp_rest) =
                InternalPageMut::<KEY_SIZE>::new(grandparent_guard.data_mut()).entries();
            let child_index = InternalPageMut::<KEY_SIZE>::new(grandparent_guard.data_mut())
                .index_of_child(parent_page_id)
                .expect("grandparent must reference the underflowed internal page");

            if child_index > 0 {
                let left_id = if child_index == 1 {
                    gp_first_child
                } else {
                    gp_rest[child_index - 2].1
                };
                let separator_key = gp_rest[child_index - 1].0.clone();
                let mut left_guard = self.bpm.fetch_write(left_id)?;
                let (left_first_child, mut left_rest) =
                    InternalPageMut::<KEY_SIZE>::new(left_guard.data_mut()).entries();
                let left_min = min_internal_size(self.internal_max_size) as usize;

                if left_rest.len() + 1 > left_min {
                    let (borrowed_key, borrowed_child) = left_rest.pop().unwrap();
                    InternalPageMut::<KEY_SIZE>::new(left_guard.data_mut())
                        .write_entries(left_first_child, &left_rest);

                    let mut new_rest = rest;
                    new_rest.insert(0, (separator_key, first_child));
                    InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut())
                        .write_entries(borrowed_child, &new_rest);

                    let mut new_gp_rest = gp_rest;
                    new_gp_rest[child_index - 1].0 = borrowed_key;
                    InternalPageMut::<KEY_SIZE>::new(grandparent_guard.data_mut())
                        .write_entries(gp_first_child, &new_gp_rest);
                    drop(left_guard);
                    ctx.write_set.push_back(grandparent_guard);
                    return Ok(true);
                }
            }

            if child_index < gp_rest.len() {
                let right_id = gp_rest[child_index].1;
                let separator_key = gp_rest[child_index].0.clone();
                let mut right_guard = self.bpm.fetch_write(right_id)?;
                let (right_first_child, mut right_rest) =
                    InternalPageMut::<KEY_SIZE>::new(right_guard.data_mut()).entries();
                let right_min = min_internal_size(self.internal_max_size) as usize;

                if right_rest.len() + 1 > right_min {
                    let mut new_rest = rest;
                    new_rest.push((separator_key, right_first_child));
                    let (new_separator_key, new_right_first_child) = right_rest.remove(0);
                    InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut())
                        .write_entries(first_child, &new_rest);
                    InternalPageMut::<KEY_SIZE>::new(right_guard.data_mut())
                        .write_entries(new_right_first_child, &right_rest);

                    let mut new_gp_rest = gp_rest.clone();
                    new_gp_rest[child_index].0 = new_separator_key;
                    InternalPageMut::<KEY_SIZE>::new(grandparent_guard.data_mut())
                        .write_entries(gp_first_child, &new_gp_rest);
                    drop(right_guard);
                    ctx.write_set.push_back(grandparent_guard);
                    return Ok(true);
                }
            }

            if child_index > 0 {
                let left_id = if child_index == 1 {
                    gp_first_child
                } else {
                    gp_rest[child_index - 2].1
                };
                let separator_key = gp_rest[child_index - 1].0.clone();
                let mut left_guard = self.bpm.fetch_write(left_id)?;
                {
                    let (left_first_child, mut left_rest) =
                        InternalPageMut::<KEY_SIZE>::new(left_guard.data_mut()).entries();
                    left_rest.push((separator_key, first_child));
                    left_rest.extend(rest);
                    InternalPageMut::<KEY_SIZE>::new(left_guard.data_mut())
                        .write_entries(left_first_child, &left_rest);
                }
                drop(left_guard);
                drop(parent_guard);
                self.bpm.delete_page(parent_page_id)?;
                ctx.write_set.push_back(grandparent_guard);
                removed_child = parent_page_id;
                continue;
            }

            let right_id = gp_rest[child_index].1;
            let separator_key = gp_rest[child_index].0.clone();
            let mut right_guard = self.bpm.fetch_write(right_id)?;
            {
                let (right_first_child, right_rest) =
                    InternalPageMut::<KEY_SIZE>::new(right_guard.data_mut()).entries();
                let mut merged_rest = rest;
                merged_rest.push((separator_key, right_first_child));
                merged_rest.extend(right_rest);
                InternalPageMut::<KEY_SIZE>::new(parent_guard.data_mut())
                    .write_entries(first_child, &merged_rest);
            }
            drop(right_guard);
            drop(parent_guard);
            self.bpm.delete_page(right_id)?;
            ctx.write_set.push_back(grandparent_guard);
            removed_child = right_id;
        }
    }

    /// An iterator over every `(key, value)` pair in ascending order.
    pub fn begin(&self) -> Result<BTreeIterator<KEY_SIZE, VALUE_SIZE>> {
        let root_page_id = self.root_page_id()?;
        if !root_page_id.is_valid() {
            return Ok(BTreeIterator::empty());
        }
        let leaf_page_id = self.leftmost_leaf(root_page_id)?;
        let guard = self.bpm.fetch_read(leaf_page_id)?;
        Ok(BTreeIterator::new(Arc::clone(&self.bpm), guard, 0))
    }

    /// An iterator starting at the first `(k, v)` with `k >= key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<BTreeIterator<KEY_SIZE, VALUE_SIZE>> {
        let root_page_id = self.root_page_id()?;
        if !root_page_id.is_valid() {
            return Ok(BTreeIterator::empty());
        }

        let mut current = self.bpm.fetch_read(root_page_id)?;
        loop {
            match page_type(current.data()) {
                BTreePageType::Internal => {
                    let child_id = InternalPageView::<KEY_SIZE>::new(current.data())
                        .child_for_key(key, self.comparator.as_ref());
                    current = self.bpm.fetch_read(child_id)?;
                }
                BTreePageType::Leaf => {
                    let idx = LeafPageView::<KEY_SIZE, VALUE_SIZE>::new(current.data())
                        .lower_bound(key, self.comparator.as_ref());
                    return Ok(BTreeIterator::new(Arc::clone(&self.bpm), current, idx));
                }
            }
        }
    }

    pub fn end(&self) -> BTreeIterator<KEY_SIZE, VALUE_SIZE> {
        BTreeIterator::empty()
    }

    fn leftmost_leaf(&self, root_page_id: crate::common::PageId) -> Result<crate::common::PageId> {
        let mut current = self.bpm.fetch_read(root_page_id)?;
        loop {
            match page_type(current.data()) {
                BTreePageType::Internal => {
                    let first_child = InternalPageView::<KEY_SIZE>::new(current.data()).first_child();
                    current = self.bpm.fetch_read(first_child)?;
                }
                BTreePageType::Leaf => return Ok(current.page_id()),
            }
        }
    }
}

fn min_leaf_size(max_size: u16) -> u16 {
    max_size.div_ceil(2)
}

fn min_internal_size(max_size: u16) -> u16 {
    max_size.div_ceil(2).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_tree(
        leaf_max: u16,
        internal_max: u16,
    ) -> (BTreeIndex<4, 4>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(64, 2, dm));
        let tree = BTreeIndex::new(bpm, leaf_max, internal_max);
        (tree, temp_file)
    }

    fn k(n: u32) -> Vec<u8> {
        n.to_le_bytes().to_vec()
    }

    #[test]
    fn empty_tree_has_no_root_and_finds_nothing() {
        let (tree, _temp) = create_tree(4, 4);
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.get_value(&k(1)).unwrap(), None);
    }

    #[test]
    fn insert_then_search_round_trips() {
        let (tree, _temp) = create_tree(4, 4);
        assert!(tree.insert(&k(10), &k(100)).unwrap());
        assert!(tree.insert(&k(20), &k(200)).unwrap());
        assert_eq!(tree.get_value(&k(10)).unwrap(), Some(k(100)));
        assert_eq!(tree.get_value(&k(20)).unwrap(), Some(k(200)));
        assert_eq!(tree.get_value(&k(30)).unwrap(), None);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (tree, _temp) = create_tree(4, 4);
        assert!(tree.insert(&k(10), &k(100)).unwrap());
        assert!(!tree.insert(&k(10), &k(999)).unwrap());
        assert_eq!(tree.get_value(&k(10)).unwrap(), Some(k(100)));
    }

    #[test]
    fn inserting_past_leaf_capacity_splits_and_grows_root() {
        let (tree, _temp) = create_tree(4, 4);
        for key in [5, 10, 15, 20, 25] {
            assert!(tree.insert(&k(key), &k(key * 10)).unwrap());
        }
        for key in [5, 10, 15, 20, 25] {
            assert_eq!(tree.get_value(&k(key)).unwrap(), Some(k(key * 10)));
        }
    }

    #[test]
    fn iteration_yields_ascending_order() {
        let (tree, _temp) = create_tree(4, 4);
        for key in [30, 10, 50, 20, 40] {
            tree.insert(&k(key), &k(key)).unwrap();
        }

        let collected: Vec<u32> = tree
            .begin()
            .unwrap()
            .map(|r| u32::from_le_bytes(r.unwrap().0.try_into().unwrap()))
            .collect();
        assert_eq!(collected, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn remove_missing_key_returns_false() {
        let (tree, _temp) = create_tree(4, 4);
        tree.insert(&k(1), &k(1)).unwrap();
        assert!(!tree.remove(&k(99)).unwrap());
    }

    #[test]
    fn remove_collapses_single_leaf_root_to_empty() {
        let (tree, _temp) = create_tree(4, 4);
        tree.insert(&k(1), &k(1)).unwrap();
        assert!(tree.remove(&k(1)).unwrap());
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.get_value(&k(1)).unwrap(), None);
    }

    #[test]
    fn remove_after_split_keeps_remaining_keys_searchable() {
        let (tree, _temp) = create_tree(4, 4);
        for key in [5, 10, 15, 20, 25] {
            tree.insert(&k(key), &k(key)).unwrap();
        }
        assert!(tree.remove(&k(15)).unwrap());
        assert_eq!(tree.get_value(&k(15)).unwrap(), None);
        for key in [5, 10, 20, 25] {
            assert_eq!(tree.get_value(&k(key)).unwrap(), Some(k(key)));
        }
    }

    #[test]
    fn heavy_insert_and_remove_leaves_consistent_tree() {
        let (tree, _temp) = create_tree(4, 4);
        let keys: Vec<u32> = (0..60).collect();
        for &key in &keys {
            assert!(tree.insert(&k(key), &k(key)).unwrap());
        }
        for &key in keys.iter().step_by(2) {
            assert!(tree.remove(&k(key)).unwrap());
        }
        for &key in &keys {
            let expected = if key % 2 == 0 { None } else { Some(k(key)) };
            assert_eq!(tree.get_value(&k(key)).unwrap(), expected);
        }
    }
}
