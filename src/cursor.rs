//! Read-only B+tree cursor (spec.md §6 "Cursor operations"): an explicit
//! stack of `(page, position)` from root to the current leaf, with two
//! sentinel positions (`BEFORE_FIRST`, `AFTER_LAST`) distinct from any valid
//! index. A cursor never blocks a writer and never mutates anything; it
//! walks the immutable pages of the revision its [`ReadTxn`] is pinned to.

use crate::btree::Tree;
use crate::btree::store::PageIo;
use crate::btree::workspace::ResolvedPage;
use crate::codec::{Leaf, Node};
use crate::error::{MavibotError, Result};
use crate::page_store::NO_PAGE;
use crate::txn::ReadTxn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafPos {
    BeforeFirst,
    At(usize),
    AfterLast,
}

/// A forward/backward cursor over one tree, pinned to the snapshot revision
/// of the [`ReadTxn`] it was opened from.
#[derive(Clone)]
pub struct Cursor<'r, 'e> {
    txn: &'r ReadTxn<'e>,
    tree: Tree,
    root: i64,
    /// Ancestors on the path from root to the current leaf, each paired with
    /// the child index taken to descend from it.
    ancestors: Vec<(Node, usize)>,
    leaf: Option<Leaf>,
    pos: LeafPos,
}

impl<'r, 'e> Cursor<'r, 'e> {
    pub(crate) fn new(txn: &'r ReadTxn<'e>, tree: Tree, root: i64) -> Self {
        Self { txn, tree, root, ancestors: Vec::new(), leaf: None, pos: LeafPos::BeforeFirst }
    }

    fn descend_leftmost(&mut self, mut offset: i64, io: &mut PageIo) -> Result<()> {
        loop {
            match io.read_page(offset)? {
                ResolvedPage::Leaf(leaf) => {
                    self.leaf = Some(leaf);
                    return Ok(());
                }
                ResolvedPage::Node(node) => {
                    let next = node.children[0];
                    self.ancestors.push((node, 0));
                    offset = next;
                }
            }
        }
    }

    fn descend_rightmost(&mut self, mut offset: i64, io: &mut PageIo) -> Result<()> {
        loop {
            match io.read_page(offset)? {
                ResolvedPage::Leaf(leaf) => {
                    self.leaf = Some(leaf);
                    return Ok(());
                }
                ResolvedPage::Node(node) => {
                    let idx = node.children.len() - 1;
                    let next = node.children[idx];
                    self.ancestors.push((node, idx));
                    offset = next;
                }
            }
        }
    }

    /// Climbs to the nearest ancestor with an untaken right sibling and
    /// descends leftmost from it. Returns `false` if no such ancestor exists
    /// (the current leaf was the last one).
    fn step_forward(&mut self, io: &mut PageIo) -> Result<bool> {
        while let Some((node, child_idx)) = self.ancestors.pop() {
            if child_idx + 1 < node.children.len() {
                let next_idx = child_idx + 1;
                let next_offset = node.children[next_idx];
                self.ancestors.push((node, next_idx));
                self.descend_leftmost(next_offset, io)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Mirror of [`Cursor::step_forward`] for backward iteration.
    fn step_backward(&mut self, io: &mut PageIo) -> Result<bool> {
        while let Some((node, child_idx)) = self.ancestors.pop() {
            if child_idx > 0 {
                let prev_idx = child_idx - 1;
                let prev_offset = node.children[prev_idx];
                self.ancestors.push((node, prev_idx));
                self.descend_rightmost(prev_offset, io)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Repositions the cursor to `BEFORE_FIRST`. The next call to
    /// [`Cursor::next`] returns the smallest key.
    pub fn before_first(&mut self) {
        self.ancestors.clear();
        self.leaf = None;
        self.pos = LeafPos::BeforeFirst;
    }

    /// Repositions the cursor to `AFTER_LAST`. The next call to
    /// [`Cursor::prev`] returns the largest key.
    pub fn after_last(&mut self) {
        self.ancestors.clear();
        self.leaf = None;
        self.pos = LeafPos::AfterLast;
    }

    /// Seeks directly to the first entry whose key is `>= key`, or to
    /// `AFTER_LAST` if every key in the tree is smaller. Used by
    /// [`ReadTxn::browse_from`].
    ///
    /// # Errors
    /// Propagates I/O and corruption errors encountered while descending.
    pub(crate) fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.ancestors.clear();
        self.leaf = None;
        if self.root == NO_PAGE {
            self.pos = LeafPos::AfterLast;
            return Ok(());
        }

        let engine = self.txn.engine();
        let mut guard = engine.lock_page_store();
        let mut head = NO_PAGE;
        let mut io = PageIo::new(&mut guard, engine.cache(), &mut head);

        let key_codec = self.tree.key_codec.clone();
        let mut offset = self.root;
        loop {
            match io.read_page(offset)? {
                ResolvedPage::Leaf(leaf) => {
                    let pos = crate::codec::find_pos(&leaf.keys, &key.to_vec(), |a, b| key_codec.compare(a, b));
                    let idx = match crate::codec::decode_pos(pos) {
                        Ok(i) | Err(i) => i,
                    };
                    self.leaf = Some(leaf);
                    if idx < self.leaf.as_ref().map(Leaf::len).unwrap_or(0) {
                        self.pos = LeafPos::At(idx);
                    } else if self.step_forward(&mut io)? {
                        self.pos = LeafPos::At(0);
                    } else {
                        self.pos = LeafPos::AfterLast;
                    }
                    return Ok(());
                }
                ResolvedPage::Node(node) => {
                    let pos = crate::codec::find_pos(&node.keys, &key.to_vec(), |a, b| key_codec.compare(a, b));
                    let child_idx = match pos {
                        p if p < 0 => (-(p + 1)) as usize + 1,
                        p => p as usize,
                    };
                    let next = node.children[child_idx];
                    self.ancestors.push((node, child_idx));
                    offset = next;
                }
            }
        }
    }

    /// Advances to the next entry. Returns `true` if the cursor now rests on
    /// an element, `false` if it reached `AFTER_LAST`.
    ///
    /// # Errors
    /// Propagates I/O and corruption errors reading pages.
    pub fn next(&mut self) -> Result<bool> {
        let engine = self.txn.engine();
        let mut guard = engine.lock_page_store();
        let mut head = NO_PAGE;
        let mut io = PageIo::new(&mut guard, engine.cache(), &mut head);

        match self.pos {
            LeafPos::AfterLast => Ok(false),
            LeafPos::BeforeFirst => {
                if self.root == NO_PAGE {
                    self.pos = LeafPos::AfterLast;
                    return Ok(false);
                }
                self.ancestors.clear();
                self.descend_leftmost(self.root, &mut io)?;
                if self.leaf.as_ref().is_none_or(Leaf::is_empty) {
                    self.pos = LeafPos::AfterLast;
                    return Ok(false);
                }
                self.pos = LeafPos::At(0);
                Ok(true)
            }
            LeafPos::At(i) => {
                let len = self.leaf.as_ref().map(Leaf::len).unwrap_or(0);
                if i + 1 < len {
                    self.pos = LeafPos::At(i + 1);
                    Ok(true)
                } else if self.step_forward(&mut io)? {
                    self.pos = LeafPos::At(0);
                    Ok(true)
                } else {
                    self.pos = LeafPos::AfterLast;
                    Ok(false)
                }
            }
        }
    }

    /// Moves to the previous entry. Returns `true` if the cursor now rests on
    /// an element, `false` if it reached `BEFORE_FIRST`.
    ///
    /// # Errors
    /// Propagates I/O and corruption errors reading pages.
    pub fn prev(&mut self) -> Result<bool> {
        let engine = self.txn.engine();
        let mut guard = engine.lock_page_store();
        let mut head = NO_PAGE;
        let mut io = PageIo::new(&mut guard, engine.cache(), &mut head);

        match self.pos {
            LeafPos::BeforeFirst => Ok(false),
            LeafPos::AfterLast => {
                if self.root == NO_PAGE {
                    self.pos = LeafPos::BeforeFirst;
                    return Ok(false);
                }
                self.ancestors.clear();
                self.descend_rightmost(self.root, &mut io)?;
                let len = self.leaf.as_ref().map(Leaf::len).unwrap_or(0);
                if len == 0 {
                    self.pos = LeafPos::BeforeFirst;
                    return Ok(false);
                }
                self.pos = LeafPos::At(len - 1);
                Ok(true)
            }
            LeafPos::At(i) => {
                if i > 0 {
                    self.pos = LeafPos::At(i - 1);
                    Ok(true)
                } else if self.step_backward(&mut io)? {
                    let len = self.leaf.as_ref().map(Leaf::len).unwrap_or(1);
                    self.pos = LeafPos::At(len - 1);
                    Ok(true)
                } else {
                    self.pos = LeafPos::BeforeFirst;
                    Ok(false)
                }
            }
        }
    }

    /// Whether [`Cursor::next`] would move to an element rather than
    /// `AFTER_LAST`. Cheap relative to a full descent but not free: probes by
    /// cloning the cursor's small path and actually stepping it.
    ///
    /// # Errors
    /// Propagates the same errors as [`Cursor::next`].
    pub fn has_next(&self) -> Result<bool> {
        self.clone().next()
    }

    /// Mirror of [`Cursor::has_next`] for backward iteration.
    ///
    /// # Errors
    /// Propagates the same errors as [`Cursor::prev`].
    pub fn has_prev(&self) -> Result<bool> {
        self.clone().prev()
    }

    /// The key at the current position.
    ///
    /// # Errors
    /// Returns [`MavibotError::Cursor`] if the cursor rests on a sentinel.
    pub fn key(&self) -> Result<&[u8]> {
        match self.pos {
            LeafPos::At(i) => Ok(&self.leaf.as_ref().expect("At(i) implies a loaded leaf").keys[i]),
            _ => Err(MavibotError::Cursor("cursor is not positioned at an element")),
        }
    }

    /// The `(key, value)` pair at the current position. For a
    /// duplicate-enabled tree this is the same single representative value
    /// [`crate::txn::ReadTxn::get`] would report; use
    /// [`crate::txn::ReadTxn::all_values`] for the full set under a key.
    ///
    /// # Errors
    /// Returns [`MavibotError::Cursor`] if the cursor rests on a sentinel, or
    /// propagates I/O errors decoding the value.
    pub fn entry(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let LeafPos::At(i) = self.pos else {
            return Err(MavibotError::Cursor("cursor is not positioned at an element"));
        };
        let leaf = self.leaf.as_ref().expect("At(i) implies a loaded leaf");
        let key = leaf.keys[i].clone();
        let raw = leaf.values[i].clone();

        let engine = self.txn.engine();
        let mut guard = engine.lock_page_store();
        let mut head = NO_PAGE;
        let mut io = PageIo::new(&mut guard, engine.cache(), &mut head);
        let value = self.tree.primary_value(&mut io, &raw)?;
        Ok((key, value))
    }

    /// Releases the cursor. Cursors hold no resources beyond the `ReadTxn`
    /// they borrow, so this is equivalent to dropping it; provided to mirror
    /// spec.md's explicit `close` operation.
    pub fn close(self) {}
}
