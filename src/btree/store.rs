//! Bridges the in-memory B+tree algorithms (`super::ops`, `super::workspace`)
//! to the paged file substrate: reads committed leaf/node pages through the
//! shared [`PageCache`], and turns a transaction's staged [`PendingPage`]s
//! into real page offsets at the end of each call.
//!
//! Grounded on the teacher's `recovery/wasp/tree.rs`'s `read_page`/
//! `write_page` pair, generalized to dispatch on an explicit 1-byte page-type
//! tag (leaf vs. node) rather than guessing from the decoded shape — spec.md
//! §4.2 pins the *logical* byte layout of a `Leaf`/`Node` exactly, so the tag
//! lives in the envelope this module owns, one layer below the codec.

use std::sync::Arc;

use crate::cache::PageCache;
use crate::codec::{Leaf, Node};
use crate::error::{MavibotError, Result};
use crate::page_store::{PageStore, is_pending_id, pending_index};

use super::workspace::{CommittedReader, PendingPage, ResolvedPage};

const TAG_LEAF: u8 = 0;
const TAG_NODE: u8 = 1;

/// Per-call handle binding a `PageStore`, its free-list head, and the shared
/// page cache. A fresh `PageIo` is constructed for every `BTree` operation;
/// it never outlives the write transaction step that created it.
pub struct PageIo<'a> {
    store: &'a mut PageStore,
    cache: &'a PageCache,
    free_list_head: &'a mut i64,
}

impl<'a> PageIo<'a> {
    pub fn new(store: &'a mut PageStore, cache: &'a PageCache, free_list_head: &'a mut i64) -> Self {
        Self { store, cache, free_list_head }
    }

    fn read_tagged(&mut self, offset: i64) -> Result<Arc<[u8]>> {
        if let Some(hit) = self.cache.get(offset) {
            return Ok(hit);
        }
        let bytes: Arc<[u8]> = Arc::from(self.store.read(offset)?);
        self.cache.insert(offset, bytes.clone());
        Ok(bytes)
    }

    pub fn read_page(&mut self, offset: i64) -> Result<ResolvedPage> {
        let bytes = self.read_tagged(offset)?;
        let (tag, payload) = bytes
            .split_first()
            .ok_or_else(|| MavibotError::Corruption(format!("empty page at offset {offset}")))?;
        match *tag {
            TAG_LEAF => Ok(ResolvedPage::Leaf(Leaf::decode(payload)?)),
            TAG_NODE => Ok(ResolvedPage::Node(Node::decode(payload)?)),
            other => Err(MavibotError::Corruption(format!("unknown page tag {other} at offset {offset}"))),
        }
    }

    pub fn alloc_leaf(&mut self, leaf: &Leaf) -> Result<i64> {
        let mut buf = vec![TAG_LEAF];
        buf.extend(leaf.encode());
        self.store.allocate(self.free_list_head, &buf)
    }

    pub fn alloc_node(&mut self, node: &Node) -> Result<i64> {
        let mut buf = vec![TAG_NODE];
        buf.extend(node.encode());
        self.store.allocate(self.free_list_head, &buf)
    }

    /// Physically frees `offset` now. Only safe for pages known unreachable
    /// by any live snapshot (the `Reclaimer`'s job); ordinary mutation must
    /// route superseded offsets through the copied-pages catalog instead.
    pub fn free_now(&mut self, offset: i64) -> Result<()> {
        self.store.free(self.free_list_head, offset)?;
        self.cache.invalidate(offset);
        Ok(())
    }

    pub fn page_store(&mut self) -> &mut PageStore {
        self.store
    }
}

impl CommittedReader for PageIo<'_> {
    fn read_leaf(&mut self, offset: i64) -> Result<Leaf> {
        match self.read_page(offset)? {
            ResolvedPage::Leaf(l) => Ok(l),
            ResolvedPage::Node(_) => Err(MavibotError::Corruption(format!("expected leaf at {offset}"))),
        }
    }

    fn read_node(&mut self, offset: i64) -> Result<Node> {
        match self.read_page(offset)? {
            ResolvedPage::Node(n) => Ok(n),
            ResolvedPage::Leaf(_) => Err(MavibotError::Corruption(format!("expected node at {offset}"))),
        }
    }
}

/// Assigns real page offsets to every page a write-transaction step staged,
/// in staging order. Staging order always places a page's children before
/// the page itself (see `workspace::Workspace`), so a single forward pass
/// can rewrite pending-id child references to the real offsets already
/// assigned to earlier entries.
pub fn finalize_pages(pending: Vec<PendingPage>, io: &mut PageIo) -> Result<Vec<i64>> {
    let mut real = Vec::with_capacity(pending.len());
    for page in pending {
        let offset = match page {
            PendingPage::Leaf(leaf) => io.alloc_leaf(&leaf)?,
            PendingPage::Node(mut node) => {
                for child in &mut node.children {
                    if is_pending_id(*child) {
                        *child = real[pending_index(*child)];
                    }
                }
                io.alloc_node(&node)?
            }
        };
        real.push(offset);
    }
    Ok(real)
}

/// Resolves a root reference that may be a pending id (from this call's own
/// workspace) into its real offset, using the table `finalize_pages` built.
#[must_use]
pub fn resolve_root(id: i64, real: &[i64]) -> i64 {
    if is_pending_id(id) { real[pending_index(id)] } else { id }
}
