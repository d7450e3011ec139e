//! The copy-on-write B+tree (spec.md §4.3): the `Tree` facade layers
//! duplicate-value handling (`ValueHolder` promotion/demotion) and
//! page-offset finalization on top of the pure algorithms in [`ops`].

pub mod ops;
pub mod result;
pub mod store;
pub mod value_holder;
pub mod workspace;

pub use result::{DeleteResult, InsertResult};
pub use store::PageIo;
pub use value_holder::ValueHolder;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::codec::ElementCodec;
use crate::error::{MavibotError, Result};
use crate::page_store::NO_PAGE;

use ops::Cmp;
use store::{finalize_pages, resolve_root};
use workspace::Workspace;

/// Outcome of inserting one key/value pair (or one duplicate value) into a
/// tree, reported to the caller in place of spec.md's thrown exceptions.
#[derive(Debug, Clone)]
pub enum PutOutcome {
    /// Non-duplicate tree: key already held this exact value. Duplicate
    /// tree: the value was already a member of the key's set.
    Exists,
    /// The key (or duplicate value) was new.
    Inserted,
    /// Non-duplicate tree only: the key existed with a different value,
    /// which has been overwritten (spec.md §4.3 outcome 2).
    Updated { previous: Vec<u8> },
}

/// Outcome of deleting a key (or one duplicate value under a key).
#[derive(Debug, Clone)]
pub enum RemoveOutcome {
    NotPresent,
    Removed { value: Vec<u8> },
}

/// A configured B+tree: fan-out, duplicate policy, and the key/value codecs
/// that give keys a comparator. Stateless — every method takes the root
/// offset and current revision explicitly, so one `Tree` value can serve
/// every revision of a named tree.
#[derive(Clone)]
pub struct Tree {
    pub fan_out: usize,
    pub allow_duplicates: bool,
    pub value_threshold_up: usize,
    pub value_threshold_low: usize,
    pub key_codec: Arc<dyn ElementCodec>,
    pub value_codec: Arc<dyn ElementCodec>,
}

impl Tree {
    fn key_cmp(&self) -> impl Fn(&[u8], &[u8]) -> Ordering + '_ {
        |a: &[u8], b: &[u8]| self.key_codec.compare(a, b)
    }

    fn value_cmp(&self) -> impl Fn(&[u8], &[u8]) -> Ordering + '_ {
        |a: &[u8], b: &[u8]| self.value_codec.compare(a, b)
    }

    /// Looks up `key`. For a duplicate-enabled tree this returns one
    /// arbitrary member of the value set (the first inline value, or the
    /// smallest key of the embedded sub-tree); see [`Tree::all_values`] for
    /// the full set.
    pub fn get(&self, io: &mut PageIo, root: i64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cmp = self.key_cmp();
        let cmp_ref: Cmp = &cmp;
        let mut committed = WsReader(io);
        let mut ws = Workspace::new(&mut committed);
        let Some(bytes) = ops::get(&mut ws, cmp_ref, root, key)? else { return Ok(None) };
        drop(committed);
        if !self.allow_duplicates {
            return Ok(Some(bytes));
        }
        let holder = ValueHolder::decode(&bytes)?;
        match holder {
            ValueHolder::Inline(values) => Ok(values.into_iter().next()),
            ValueHolder::SubTree { root, .. } => self.leftmost_key(io, root),
        }
    }

    /// Every value currently stored under `key` (duplicate-enabled trees
    /// only; non-duplicate trees have at most one and should use `get`).
    pub fn all_values(&self, io: &mut PageIo, root: i64, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        debug_assert!(self.allow_duplicates, "all_values is only meaningful for duplicate trees");
        let cmp = self.key_cmp();
        let cmp_ref: Cmp = &cmp;
        let mut committed = WsReader(io);
        let mut ws = Workspace::new(&mut committed);
        let Some(bytes) = ops::get(&mut ws, cmp_ref, root, key)? else { return Ok(Vec::new()) };
        drop(committed);
        match ValueHolder::decode(&bytes)? {
            ValueHolder::Inline(values) => Ok(values),
            ValueHolder::SubTree { root, .. } => collect_all_keys(io, root),
        }
    }

    pub fn contains(&self, io: &mut PageIo, root: i64, key: &[u8], value: &[u8]) -> Result<bool> {
        if !self.allow_duplicates {
            return Ok(self.get(io, root, key)?.as_deref() == Some(value));
        }
        for v in self.all_values(io, root, key)? {
            if self.value_codec.compare(&v, value) == Ordering::Equal {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decodes a leaf's raw value-holder bytes into the one value a cursor
    /// reports for that entry (same rule as [`Tree::get`]'s duplicate-tree
    /// branch, reused so a cursor walk doesn't need to know about
    /// `ValueHolder` at all).
    pub(crate) fn primary_value(&self, io: &mut PageIo, raw: &[u8]) -> Result<Vec<u8>> {
        if !self.allow_duplicates {
            return Ok(raw.to_vec());
        }
        match ValueHolder::decode(raw)? {
            ValueHolder::Inline(values) => Ok(values.into_iter().next().unwrap_or_default()),
            ValueHolder::SubTree { root, .. } => Ok(self.leftmost_key(io, root)?.unwrap_or_default()),
        }
    }

    fn leftmost_key(&self, io: &mut PageIo, mut root: i64) -> Result<Option<Vec<u8>>> {
        loop {
            if root == NO_PAGE {
                return Ok(None);
            }
            match io.read_page(root)? {
                workspace::ResolvedPage::Leaf(l) => return Ok(l.keys.into_iter().next()),
                workspace::ResolvedPage::Node(n) => root = n.children[0],
            }
        }
    }

    /// Inserts `key -> value`. Returns the new root offset, the outcome, and
    /// every previously-committed offset this call superseded (to be folded
    /// into the enclosing transaction's copied-pages list — these pages
    /// must NOT be freed yet; a live snapshot may still reference them).
    pub fn insert(
        &self,
        io: &mut PageIo,
        root: i64,
        revision: u64,
        key: &[u8],
        value: &[u8],
    ) -> Result<(i64, PutOutcome, Vec<i64>)> {
        if !self.allow_duplicates {
            let (new_root, result, copied) = self.insert_raw(io, root, revision, key, value)?;
            let outcome = match result {
                InsertResult::Exists => PutOutcome::Exists,
                InsertResult::Modified { previous_value: Some(p), .. } => PutOutcome::Updated { previous: p },
                InsertResult::Modified { previous_value: None, .. } => PutOutcome::Inserted,
                InsertResult::Split { .. } => unreachable!("insert_raw always resolves splits into a new root"),
            };
            return Ok((new_root, outcome, copied));
        }

        let mut copied = Vec::new();
        let old_bytes = self.get_holder_bytes(io, root, key)?;
        let mut holder = match old_bytes {
            Some(b) => ValueHolder::decode(&b)?,
            None => ValueHolder::default(),
        };

        let already_present = match &holder {
            ValueHolder::Inline(values) => {
                values.iter().any(|v| self.value_codec.compare(v, value) == Ordering::Equal)
            }
            ValueHolder::SubTree { root: sub_root, .. } => {
                collect_all_keys(io, *sub_root)?.iter().any(|v| self.value_codec.compare(v, value) == Ordering::Equal)
            }
        };
        if already_present {
            return Ok((root, PutOutcome::Exists, copied));
        }

        match &mut holder {
            ValueHolder::Inline(values) if values.len() + 1 <= self.value_threshold_up => {
                values.push(value.to_vec());
            }
            ValueHolder::Inline(values) => {
                let mut all: Vec<Vec<u8>> = std::mem::take(values).into_iter().collect();
                all.push(value.to_vec());
                let (sub_root, sub_copied) = self.build_subtree(io, revision, &all)?;
                copied.extend(sub_copied);
                holder = ValueHolder::SubTree { root: sub_root, revision };
            }
            ValueHolder::SubTree { root: sub_root, .. } => {
                let (new_sub_root, sub_copied) = self.insert_subtree_marker(io, *sub_root, revision, value)?;
                copied.extend(sub_copied);
                holder = ValueHolder::SubTree { root: new_sub_root, revision };
            }
        }

        let holder_bytes = holder.encode();
        let (new_root, _result, top_copied) = self.insert_raw(io, root, revision, key, &holder_bytes)?;
        copied.extend(top_copied);
        Ok((new_root, PutOutcome::Inserted, copied))
    }

    /// Deletes `key`. If `value` is given on a duplicate-enabled tree, only
    /// that value is removed from the key's set (demoting the holder back
    /// to an inline array once membership drops to `value_threshold_low`);
    /// the key itself is removed once its set is empty. `value` is ignored
    /// for non-duplicate trees (the whole key is removed).
    pub fn delete(
        &self,
        io: &mut PageIo,
        root: i64,
        revision: u64,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<(i64, RemoveOutcome, Vec<i64>)> {
        if !self.allow_duplicates || value.is_none() {
            return self.delete_raw(io, root, revision, key);
        }
        let value = value.unwrap();

        let Some(old_bytes) = self.get_holder_bytes(io, root, key)? else {
            return Ok((root, RemoveOutcome::NotPresent, Vec::new()));
        };
        let holder = ValueHolder::decode(&old_bytes)?;
        let mut copied = Vec::new();

        let remaining: Vec<Vec<u8>> = match holder {
            ValueHolder::Inline(values) => {
                let before = values.len();
                let kept: Vec<Vec<u8>> =
                    values.into_iter().filter(|v| self.value_codec.compare(v, value) != Ordering::Equal).collect();
                if kept.len() == before {
                    return Ok((root, RemoveOutcome::NotPresent, copied));
                }
                kept
            }
            ValueHolder::SubTree { root: sub_root, .. } => {
                let all = collect_all_keys(io, sub_root)?;
                let kept: Vec<Vec<u8>> =
                    all.iter().filter(|v| self.value_codec.compare(v, value) != Ordering::Equal).cloned().collect();
                if kept.len() == all.len() {
                    return Ok((root, RemoveOutcome::NotPresent, copied));
                }
                kept
            }
        };

        if remaining.is_empty() {
            let (new_root, result, del_copied) = self.delete_raw(io, root, revision, key)?;
            copied.extend(del_copied);
            return Ok((new_root, result, copied));
        }

        let new_holder = if remaining.len() <= self.value_threshold_low {
            ValueHolder::Inline(remaining)
        } else {
            let (sub_root, sub_copied) = self.build_subtree(io, revision, &remaining)?;
            copied.extend(sub_copied);
            ValueHolder::SubTree { root: sub_root, revision }
        };

        let holder_bytes = new_holder.encode();
        let (new_root, _result, top_copied) = self.insert_raw(io, root, revision, key, &holder_bytes)?;
        copied.extend(top_copied);
        Ok((new_root, RemoveOutcome::Removed { value: value.to_vec() }, copied))
    }

    fn get_holder_bytes(&self, io: &mut PageIo, root: i64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cmp = self.key_cmp();
        let cmp_ref: Cmp = &cmp;
        let mut committed = WsReader(io);
        let mut ws = Workspace::new(&mut committed);
        ops::get(&mut ws, cmp_ref, root, key)
    }

    /// Raw single-key insert (no duplicate bookkeeping): stages pages via
    /// `ops::insert`, then finalizes them to real offsets.
    fn insert_raw(
        &self,
        io: &mut PageIo,
        root: i64,
        revision: u64,
        key: &[u8],
        value_bytes: &[u8],
    ) -> Result<(i64, InsertResult, Vec<i64>)> {
        let cmp = self.key_cmp();
        let cmp_ref: Cmp = &cmp;
        let (new_root_id, result, pending, copied) = {
            let mut committed = WsReader(io);
            let mut ws = Workspace::new(&mut committed);
            let (new_root_id, result) = ops::insert(&mut ws, cmp_ref, self.fan_out, root, revision, key, value_bytes)?;
            let (pending, copied) = ws.into_parts();
            (new_root_id, result, pending, copied)
        };
        let real = finalize_pages(pending, io)?;
        let new_root = resolve_root(new_root_id, &real);
        let result = match result {
            InsertResult::Exists => InsertResult::Exists,
            InsertResult::Modified { new_page, previous_value } => {
                InsertResult::Modified { new_page: resolve_root(new_page, &real), previous_value }
            }
            InsertResult::Split { .. } => {
                InsertResult::Modified { new_page: new_root, previous_value: None }
            }
        };
        Ok((new_root, result, copied))
    }

    fn delete_raw(
        &self,
        io: &mut PageIo,
        root: i64,
        revision: u64,
        key: &[u8],
    ) -> Result<(i64, RemoveOutcome, Vec<i64>)> {
        let cmp = self.key_cmp();
        let cmp_ref: Cmp = &cmp;
        let (new_root_id, result, pending, copied) = {
            let mut committed = WsReader(io);
            let mut ws = Workspace::new(&mut committed);
            let (new_root_id, result) = ops::delete(&mut ws, cmp_ref, self.fan_out, root, revision, key)?;
            let (pending, copied) = ws.into_parts();
            (new_root_id, result, pending, copied)
        };
        let real = finalize_pages(pending, io)?;
        let outcome = match result {
            DeleteResult::NotPresent => return Ok((root, RemoveOutcome::NotPresent, Vec::new())),
            DeleteResult::Remove { removed, .. }
            | DeleteResult::BorrowedFromLeft { removed, .. }
            | DeleteResult::BorrowedFromRight { removed, .. }
            | DeleteResult::Merged { removed, .. } => RemoveOutcome::Removed { value: removed },
        };
        let new_root = resolve_root(new_root_id, &real);
        Ok((new_root, outcome, copied))
    }

    /// Builds a fresh embedded sub-tree (value promotion) containing every
    /// value in `values` as a key with an empty marker payload.
    fn build_subtree(&self, io: &mut PageIo, revision: u64, values: &[Vec<u8>]) -> Result<(i64, Vec<i64>)> {
        self.insert_subtree_markers(io, NO_PAGE, revision, values)
    }

    fn insert_subtree_marker(
        &self,
        io: &mut PageIo,
        root: i64,
        revision: u64,
        value: &[u8],
    ) -> Result<(i64, Vec<i64>)> {
        self.insert_subtree_markers(io, root, revision, std::slice::from_ref(&value.to_vec()))
    }

    fn insert_subtree_markers(
        &self,
        io: &mut PageIo,
        mut root: i64,
        revision: u64,
        values: &[Vec<u8>],
    ) -> Result<(i64, Vec<i64>)> {
        let cmp = self.value_cmp();
        let cmp_ref: Cmp = &cmp;
        let mut copied = Vec::new();
        for v in values {
            let (new_root_id, _result, pending, this_copied) = {
                let mut committed = WsReader(io);
                let mut ws = Workspace::new(&mut committed);
                let (new_root_id, result) = ops::insert(&mut ws, cmp_ref, self.fan_out, root, revision, v, &[])?;
                let (pending, copied) = ws.into_parts();
                (new_root_id, result, pending, copied)
            };
            let real = finalize_pages(pending, io)?;
            root = resolve_root(new_root_id, &real);
            copied.extend(this_copied);
        }
        Ok((root, copied))
    }
}

/// Walks every leaf reachable from `root`, left to right, collecting keys
/// (used to enumerate an embedded duplicate-value sub-tree, which stores
/// each value as a key with an empty payload).
fn collect_all_keys(io: &mut PageIo, root: i64) -> Result<Vec<Vec<u8>>> {
    if root == NO_PAGE {
        return Ok(Vec::new());
    }
    match io.read_page(root)? {
        workspace::ResolvedPage::Leaf(leaf) => Ok(leaf.keys),
        workspace::ResolvedPage::Node(node) => {
            let mut out = Vec::new();
            for child in node.children {
                out.extend(collect_all_keys(io, child)?);
            }
            Ok(out)
        }
    }
}

/// Walks every leaf reachable from `root`, left to right, collecting
/// `(key, value)` pairs. Used to rebuild the in-memory tree registry from the
/// on-disk tree-of-trees catalog at open time.
pub fn collect_all_entries(io: &mut PageIo, root: i64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if root == NO_PAGE {
        return Ok(Vec::new());
    }
    match io.read_page(root)? {
        workspace::ResolvedPage::Leaf(leaf) => Ok(leaf.keys.into_iter().zip(leaf.values).collect()),
        workspace::ResolvedPage::Node(node) => {
            let mut out = Vec::new();
            for child in node.children {
                out.extend(collect_all_entries(io, child)?);
            }
            Ok(out)
        }
    }
}

/// Adapts a borrowed [`PageIo`] to [`workspace::CommittedReader`] without
/// taking ownership, so callers can keep using `io` for finalization right
/// after the `Workspace` borrowing it is dropped.
struct WsReader<'a, 'b>(&'a mut PageIo<'b>);

impl workspace::CommittedReader for WsReader<'_, '_> {
    fn read_leaf(&mut self, offset: i64) -> Result<crate::codec::Leaf> {
        self.0.read_leaf(offset)
    }

    fn read_node(&mut self, offset: i64) -> Result<crate::codec::Node> {
        self.0.read_node(offset)
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("fan_out", &self.fan_out)
            .field("allow_duplicates", &self.allow_duplicates)
            .field("key_codec", &self.key_codec.id())
            .field("value_codec", &self.value_codec.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BytesCodec;
    use crate::page_store::PageStore;
    use tempfile::NamedTempFile;

    fn tree(allow_duplicates: bool) -> Tree {
        Tree {
            fan_out: 4,
            allow_duplicates,
            value_threshold_up: 3,
            value_threshold_low: 1,
            key_codec: Arc::new(BytesCodec),
            value_codec: Arc::new(BytesCodec),
        }
    }

    fn store() -> PageStore {
        let f = NamedTempFile::new().unwrap();
        PageStore::create(f.path(), 256).unwrap()
    }

    #[test]
    fn insert_get_and_update() {
        let t = tree(false);
        let mut ps = store();
        let cache = crate::cache::PageCache::new(64);
        let mut head = crate::page_store::FREE_LIST_END;
        let mut io = PageIo::new(&mut ps, &cache, &mut head);

        let (root, outcome, _) = t.insert(&mut io, NO_PAGE, 1, b"a", b"1").unwrap();
        assert!(matches!(outcome, PutOutcome::Inserted));
        assert_eq!(t.get(&mut io, root, b"a").unwrap().as_deref(), Some(b"1".as_slice()));

        let (root2, outcome2, _) = t.insert(&mut io, root, 2, b"a", b"2").unwrap();
        assert!(matches!(outcome2, PutOutcome::Updated { .. }));
        assert_eq!(t.get(&mut io, root2, b"a").unwrap().as_deref(), Some(b"2".as_slice()));
    }

    #[test]
    fn delete_round_trip() {
        let t = tree(false);
        let mut ps = store();
        let cache = crate::cache::PageCache::new(64);
        let mut head = crate::page_store::FREE_LIST_END;
        let mut io = PageIo::new(&mut ps, &cache, &mut head);

        let (root, _, _) = t.insert(&mut io, NO_PAGE, 1, b"a", b"1").unwrap();
        let (root, outcome, _) = t.delete(&mut io, root, 2, b"a", None).unwrap();
        assert!(matches!(outcome, RemoveOutcome::Removed { .. }));
        assert!(t.get(&mut io, root, b"a").unwrap().is_none());
    }

    #[test]
    fn duplicate_values_promote_and_demote() {
        let t = tree(true);
        let mut ps = store();
        let cache = crate::cache::PageCache::new(64);
        let mut head = crate::page_store::FREE_LIST_END;
        let mut io = PageIo::new(&mut ps, &cache, &mut head);

        let mut root = NO_PAGE;
        for v in 1u8..=4 {
            let (new_root, outcome, _) = t.insert(&mut io, root, u64::from(v), b"k", &[v]).unwrap();
            assert!(matches!(outcome, PutOutcome::Inserted));
            root = new_root;
        }
        // threshold_up = 3, so the 4th distinct value promotes to a sub-tree.
        let mut values = t.all_values(&mut io, root, b"k").unwrap();
        values.sort();
        assert_eq!(values, vec![vec![1u8], vec![2], vec![3], vec![4]]);

        for v in [4u8, 3, 2] {
            let (new_root, outcome, _) = t.delete(&mut io, root, 10, b"k", Some(&[v])).unwrap();
            assert!(matches!(outcome, RemoveOutcome::Removed { .. }));
            root = new_root;
        }
        // Down to one value: should have demoted back to inline.
        assert_eq!(t.all_values(&mut io, root, b"k").unwrap(), vec![vec![1u8]]);

        let (root, outcome, _) = t.delete(&mut io, root, 11, b"k", Some(&[1u8])).unwrap();
        assert!(matches!(outcome, RemoveOutcome::Removed { .. }));
        assert!(t.get(&mut io, root, b"k").unwrap().is_none());
    }

    #[test]
    fn reinserting_same_duplicate_value_is_exists() {
        let t = tree(true);
        let mut ps = store();
        let cache = crate::cache::PageCache::new(64);
        let mut head = crate::page_store::FREE_LIST_END;
        let mut io = PageIo::new(&mut ps, &cache, &mut head);

        let (root, _, _) = t.insert(&mut io, NO_PAGE, 1, b"k", b"v").unwrap();
        let (_, outcome, copied) = t.insert(&mut io, root, 2, b"k", b"v").unwrap();
        assert!(matches!(outcome, PutOutcome::Exists));
        assert!(copied.is_empty());
    }
}
