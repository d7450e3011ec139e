//! The in-memory working set a single write transaction stages pages into
//! before they are assigned real offsets at commit (spec.md §3 "pending ids",
//! §9 "Thread-local transaction depth counters ... replaced by an explicit
//! `WriteTxn` value").

use std::collections::HashMap;

use crate::codec::{Leaf, Node};
use crate::error::{MavibotError, Result};
use crate::page_store::{is_pending_id, pending_id, pending_index};

/// A page that exists only in memory, not yet written to disk.
#[derive(Debug, Clone)]
pub enum PendingPage {
    Leaf(Leaf),
    Node(Node),
}

/// Reads already-committed pages, on demand. Implemented over `PageStore` +
/// `PageCodec` by the engine layer; kept abstract here so the algorithms in
/// this module have no direct file dependency.
pub trait CommittedReader {
    fn read_leaf(&mut self, offset: i64) -> Result<Leaf>;
    fn read_node(&mut self, offset: i64) -> Result<Node>;
}

/// Either a leaf or a node, resolved from a committed offset or a pending id.
#[derive(Debug, Clone)]
pub enum ResolvedPage {
    Leaf(Leaf),
    Node(Node),
}

impl ResolvedPage {
    #[must_use]
    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Self::Leaf(l) => Some(l),
            Self::Node(_) => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(n) => Some(n),
            Self::Leaf(_) => None,
        }
    }
}

/// Tracks pages staged by the current write transaction, plus the set of
/// previously-committed offsets it has superseded (for the copied-pages
/// catalog).
pub struct Workspace<'a> {
    committed: &'a mut dyn CommittedReader,
    pending: Vec<PendingPage>,
    /// Cache of already-resolved committed pages read this transaction, to
    /// avoid re-reading a page touched twice on one path.
    resolved_cache: HashMap<i64, ResolvedPage>,
    pub copied_pages: Vec<i64>,
}

impl<'a> Workspace<'a> {
    pub fn new(committed: &'a mut dyn CommittedReader) -> Self {
        Self { committed, pending: Vec::new(), resolved_cache: HashMap::new(), copied_pages: Vec::new() }
    }

    /// Stages a new leaf, returning the pending id that refers to it.
    pub fn stage_leaf(&mut self, leaf: Leaf) -> i64 {
        let idx = self.pending.len();
        self.pending.push(PendingPage::Leaf(leaf));
        pending_id(idx)
    }

    /// Stages a new node, returning the pending id that refers to it.
    pub fn stage_node(&mut self, node: Node) -> i64 {
        let idx = self.pending.len();
        self.pending.push(PendingPage::Node(node));
        pending_id(idx)
    }

    /// Records that `offset` (a previously-committed page) has been
    /// superseded by this transaction and should be considered for
    /// reclamation once no snapshot can see it.
    pub fn mark_copied(&mut self, offset: i64) {
        if !is_pending_id(offset) {
            self.copied_pages.push(offset);
        }
    }

    pub fn resolve(&mut self, offset: i64) -> Result<ResolvedPage> {
        if is_pending_id(offset) {
            let idx = pending_index(offset);
            return self.pending.get(idx).cloned().map(Into::into).ok_or_else(|| {
                MavibotError::Corruption(format!("dangling pending id at index {idx}"))
            });
        }
        if let Some(p) = self.resolved_cache.get(&offset) {
            return Ok(p.clone());
        }
        let leaf_attempt = self.committed.read_leaf(offset);
        let resolved = match leaf_attempt {
            Ok(leaf) => ResolvedPage::Leaf(leaf),
            Err(_) => ResolvedPage::Node(self.committed.read_node(offset)?),
        };
        self.resolved_cache.insert(offset, resolved.clone());
        Ok(resolved)
    }

    pub fn resolve_leaf(&mut self, offset: i64) -> Result<Leaf> {
        match self.resolve(offset)? {
            ResolvedPage::Leaf(l) => Ok(l),
            ResolvedPage::Node(_) => {
                Err(MavibotError::Corruption(format!("expected leaf at {offset}, found node")))
            }
        }
    }

    pub fn resolve_node(&mut self, offset: i64) -> Result<Node> {
        match self.resolve(offset)? {
            ResolvedPage::Node(n) => Ok(n),
            ResolvedPage::Leaf(_) => {
                Err(MavibotError::Corruption(format!("expected node at {offset}, found leaf")))
            }
        }
    }

    /// Consumes the workspace, returning every staged page in allocation
    /// order (the caller assigns real offsets and rewrites child/parent
    /// pointers before persisting) and the list of superseded offsets.
    #[must_use]
    pub fn into_parts(self) -> (Vec<PendingPage>, Vec<i64>) {
        (self.pending, self.copied_pages)
    }
}

impl From<PendingPage> for ResolvedPage {
    fn from(p: PendingPage) -> Self {
        match p {
            PendingPage::Leaf(l) => Self::Leaf(l),
            PendingPage::Node(n) => Self::Node(n),
        }
    }
}
