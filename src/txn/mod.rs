//! The MVCC transaction layer: a single write transaction at a time, guarded
//! by a process-wide mutex, and any number of concurrent read transactions
//! pinned to the revision that was committed when they opened.
//!
//! A read transaction never blocks the writer and the writer never blocks a
//! reader: each clones the small in-memory tree registry it needs up front
//! and only takes the shared page-store lock for the duration of one B+tree
//! descent, never for its own lifetime.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::btree::{PageIo, PutOutcome, RemoveOutcome, Tree};
use crate::catalog;
use crate::codec::{TreeHeader, TreeInfo, TreeKind};
use crate::engine::{Engine, TreeState};
use crate::error::{MavibotError, Result};
use crate::page_store::NO_PAGE;

/// One live read snapshot's bookkeeping in the engine's registry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SnapshotEntry {
    pub revision: u64,
    pub opened_at: Instant,
    pub timeout: Option<Duration>,
}

enum TxnState {
    Active,
    Poisoned(&'static str),
    Done,
}

/// A pinned, read-only view of the store as of the revision that was current
/// when it was opened. Pages superseded after this point remain readable
/// until every such snapshot closes (see [`crate::reclaim::Reclaimer`]).
pub struct ReadTxn<'e> {
    engine: &'e Engine,
    snapshot_id: u64,
    revision: u64,
    trees: HashMap<String, TreeState>,
}

impl<'e> ReadTxn<'e> {
    pub(crate) fn new(engine: &'e Engine, snapshot_id: u64, revision: u64, trees: HashMap<String, TreeState>) -> Self {
        Self { engine, snapshot_id, revision, trees }
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    fn check_alive(&self) -> Result<()> {
        if self.engine.snapshot_alive(self.snapshot_id) {
            Ok(())
        } else {
            Err(MavibotError::BadTransactionState("read transaction timed out"))
        }
    }

    pub(crate) fn state(&self, name: &str) -> Result<&TreeState> {
        self.trees.get(name).ok_or_else(|| MavibotError::TreeNotFound(name.to_string()))
    }

    fn tree(&self, name: &str) -> Result<(&TreeState, Tree)> {
        let state = self.state(name)?;
        Ok((state, self.engine.tree_facade(&state.info)?))
    }

    /// # Errors
    /// Returns [`MavibotError::TreeNotFound`] if `tree` was not open when this
    /// snapshot was taken, or [`MavibotError::BadTransactionState`] if the
    /// snapshot has expired.
    pub fn get(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_alive()?;
        let (state, t) = self.tree(tree)?;
        let mut head = NO_PAGE;
        let mut guard = self.engine.lock_page_store();
        let mut io = PageIo::new(&mut guard, self.engine.cache(), &mut head);
        t.get(&mut io, state.header.root_offset, key)
    }

    /// # Errors
    /// Returns the same errors as [`ReadTxn::get`].
    pub fn contains(&self, tree: &str, key: &[u8], value: &[u8]) -> Result<bool> {
        self.check_alive()?;
        let (state, t) = self.tree(tree)?;
        let mut head = NO_PAGE;
        let mut guard = self.engine.lock_page_store();
        let mut io = PageIo::new(&mut guard, self.engine.cache(), &mut head);
        t.contains(&mut io, state.header.root_offset, key, value)
    }

    /// Every value currently stored under `key` in a duplicate-enabled tree.
    ///
    /// # Errors
    /// Returns the same errors as [`ReadTxn::get`].
    pub fn all_values(&self, tree: &str, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.check_alive()?;
        let (state, t) = self.tree(tree)?;
        let mut head = NO_PAGE;
        let mut guard = self.engine.lock_page_store();
        let mut io = PageIo::new(&mut guard, self.engine.cache(), &mut head);
        t.all_values(&mut io, state.header.root_offset, key)
    }

    /// Opens a forward cursor over `tree`, starting before the first entry.
    ///
    /// # Errors
    /// Returns [`MavibotError::TreeNotFound`] if `tree` is not open.
    pub fn browse(&self, tree: &str) -> Result<crate::cursor::Cursor<'_, 'e>> {
        self.check_alive()?;
        let (state, t) = self.tree(tree)?;
        Ok(crate::cursor::Cursor::new(self, t, state.header.root_offset))
    }

    /// Opens a cursor seeked directly to the first entry whose key is
    /// `>= key` (spec.md §6 `browseFrom`).
    ///
    /// # Errors
    /// Returns [`MavibotError::TreeNotFound`] if `tree` is not open, or
    /// propagates I/O errors from the seek.
    pub fn browse_from(&self, tree: &str, key: &[u8]) -> Result<crate::cursor::Cursor<'_, 'e>> {
        self.check_alive()?;
        let (state, t) = self.tree(tree)?;
        let mut cursor = crate::cursor::Cursor::new(self, t, state.header.root_offset);
        cursor.seek(key)?;
        Ok(cursor)
    }

    /// Closes this snapshot early, releasing it from the engine's registry
    /// before its timeout would otherwise do so. Idempotent.
    pub fn close(self) {
        self.engine.release_snapshot(self.snapshot_id);
    }
}

impl Drop for ReadTxn<'_> {
    fn drop(&mut self) {
        self.engine.release_snapshot(self.snapshot_id);
    }
}

/// The single write transaction, held exclusively by one caller at a time.
pub struct WriteTxn<'e> {
    engine: &'e Engine,
    _writer_guard: parking_lot::MutexGuard<'e, ()>,
    base_revision: u64,
    free_list_head: i64,
    tree_of_trees_root: i64,
    copied_pages_root: i64,
    trees: HashMap<String, TreeState>,
    touched: Vec<String>,
    copied_by_tree: HashMap<String, Vec<i64>>,
    state: TxnState,
}

impl<'e> WriteTxn<'e> {
    pub(crate) fn new(engine: &'e Engine, guard: parking_lot::MutexGuard<'e, ()>) -> Self {
        let header = engine.committed_header();
        let trees = engine.tree_registry_snapshot();
        Self {
            engine,
            _writer_guard: guard,
            base_revision: header.revision,
            free_list_head: header.free_list_head,
            tree_of_trees_root: header.tree_of_trees_root,
            copied_pages_root: header.copied_pages_root,
            trees,
            touched: Vec::new(),
            copied_by_tree: HashMap::new(),
            state: TxnState::Active,
        }
    }

    fn check_active(&self) -> Result<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Poisoned(why) => Err(MavibotError::BadTransactionState(why)),
            TxnState::Done => Err(MavibotError::BadTransactionState("transaction already committed or aborted")),
        }
    }

    fn poison_on_err<T>(&mut self, r: Result<T>) -> Result<T> {
        if let Err(e) = &r {
            if !e.is_recoverable() {
                self.state = TxnState::Poisoned("a prior operation failed");
            }
        }
        r
    }

    fn note_touched(&mut self, name: &str, copied: Vec<i64>) {
        if !self.touched.iter().any(|n| n == name) {
            self.touched.push(name.to_string());
        }
        self.copied_by_tree.entry(name.to_string()).or_default().extend(copied);
    }

    fn tree_of(&self, name: &str) -> Result<Tree> {
        let state = self.trees.get(name).ok_or_else(|| MavibotError::TreeNotFound(name.to_string()))?;
        self.engine.tree_facade(&state.info)
    }

    /// Registers a new, empty tree under `name`.
    ///
    /// # Errors
    /// Returns [`MavibotError::TreeAlreadyManaged`] if `name` is already open,
    /// or [`MavibotError::Config`] if `key_codec_id`/`value_codec_id` aren't
    /// registered.
    pub fn create_tree(
        &mut self,
        name: &str,
        key_codec_id: &str,
        value_codec_id: &str,
        config: &crate::config::TreeConfig,
    ) -> Result<()> {
        self.check_active()?;
        if self.trees.contains_key(name) {
            let r = Err(MavibotError::TreeAlreadyManaged(name.to_string()));
            return self.poison_on_err(r);
        }
        self.engine.resolve_codec(key_codec_id)?;
        self.engine.resolve_codec(value_codec_id)?;
        let kind = if name == catalog::TREE_OF_TREES_NAME {
            TreeKind::TreeOfTrees
        } else if name == catalog::COPIED_PAGES_NAME {
            TreeKind::CopiedPages
        } else {
            TreeKind::User
        };
        if !matches!(kind, TreeKind::User) && config.allow_duplicates {
            let r = Err(MavibotError::Config(format!(
                "catalog tree {name} cannot allow duplicate values (spec.md open question, resolved in DESIGN.md)"
            )));
            return self.poison_on_err(r);
        }
        let info = TreeInfo {
            fan_out: config.fan_out() as u32,
            name: name.to_string(),
            key_codec_id: key_codec_id.to_string(),
            value_codec_id: value_codec_id.to_string(),
            kind: kind as u8,
            allow_duplicates: config.allow_duplicates,
            value_threshold_up: config.value_threshold_up as u32,
            value_threshold_low: config.value_threshold_low as u32,
        };
        let header = TreeHeader { revision: self.base_revision, element_count: 0, root_offset: NO_PAGE, tree_info_offset: NO_PAGE };
        self.trees.insert(name.to_string(), TreeState { info, header, tree_header_offset: NO_PAGE });
        self.touched.push(name.to_string());
        Ok(())
    }

    /// # Errors
    /// Returns [`MavibotError::TreeNotFound`] if `tree` isn't open, or
    /// propagates I/O and corruption errors.
    pub fn insert(&mut self, tree: &str, key: &[u8], value: &[u8]) -> Result<PutOutcome> {
        self.check_active()?;
        let r = self.insert_inner(tree, key, value);
        self.poison_on_err(r)
    }

    fn insert_inner(&mut self, tree: &str, key: &[u8], value: &[u8]) -> Result<PutOutcome> {
        let t = self.tree_of(tree)?;
        let root = self.trees[tree].header.root_offset;
        let new_revision = self.base_revision + 1;
        let engine = self.engine;
        let (new_root, outcome, copied) = {
            let mut guard = engine.lock_page_store();
            let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
            t.insert(&mut io, root, new_revision, key, value)?
        };
        let grows = matches!(outcome, PutOutcome::Inserted);
        let state = self.trees.get_mut(tree).unwrap();
        state.header.root_offset = new_root;
        if grows {
            state.header.element_count += 1;
        }
        self.note_touched(tree, copied);
        Ok(outcome)
    }

    /// # Errors
    /// Returns [`MavibotError::TreeNotFound`] if `tree` isn't open, or
    /// propagates I/O and corruption errors.
    pub fn delete(&mut self, tree: &str, key: &[u8], value: Option<&[u8]>) -> Result<RemoveOutcome> {
        self.check_active()?;
        let r = self.delete_inner(tree, key, value);
        self.poison_on_err(r)
    }

    fn delete_inner(&mut self, tree: &str, key: &[u8], value: Option<&[u8]>) -> Result<RemoveOutcome> {
        let t = self.tree_of(tree)?;
        let root = self.trees[tree].header.root_offset;
        let new_revision = self.base_revision + 1;
        let engine = self.engine;
        let (new_root, outcome, copied) = {
            let mut guard = engine.lock_page_store();
            let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
            t.delete(&mut io, root, new_revision, key, value)?
        };
        let shrinks = matches!(outcome, RemoveOutcome::Removed { .. });
        let state = self.trees.get_mut(tree).unwrap();
        state.header.root_offset = new_root;
        if shrinks {
            state.header.element_count = state.header.element_count.saturating_sub(1);
        }
        self.note_touched(tree, copied);
        Ok(outcome)
    }

    /// Reads back this transaction's own uncommitted writes.
    ///
    /// # Errors
    /// Returns [`MavibotError::TreeNotFound`] if `tree` isn't open.
    pub fn get(&mut self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_active()?;
        let t = self.tree_of(tree)?;
        let root = self.trees[tree].header.root_offset;
        let engine = self.engine;
        let mut guard = engine.lock_page_store();
        let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
        t.get(&mut io, root, key)
    }

    /// Commits every write made on this transaction, publishing a new
    /// revision. Consumes `self`; the writer lock is released on return.
    ///
    /// # Errors
    /// Returns an error (without publishing anything) if this transaction was
    /// already poisoned, or if the final header flush fails.
    pub fn commit(mut self) -> Result<u64> {
        self.check_active()?;
        let new_revision = self.base_revision + 1;
        let engine = self.engine;
        let touched = self.touched.clone();

        for name in touched {
            let mut state = self.trees.get(&name).unwrap().clone();

            let info_offset = if state.header.tree_info_offset == NO_PAGE {
                let bytes = state.info.encode();
                let mut guard = engine.lock_page_store();
                guard.allocate(&mut self.free_list_head, &bytes)?
            } else {
                state.header.tree_info_offset
            };

            let new_header = TreeHeader {
                revision: new_revision,
                element_count: state.header.element_count,
                root_offset: state.header.root_offset,
                tree_info_offset: info_offset,
            };
            let new_header_offset = {
                let mut guard = engine.lock_page_store();
                guard.allocate(&mut self.free_list_head, &new_header.encode())?
            };

            let mut copied = self.copied_by_tree.remove(&name).unwrap_or_default();
            if state.tree_header_offset != NO_PAGE {
                copied.push(state.tree_header_offset);
            }

            let tot = catalog::catalog_tree();
            let key = catalog::tree_of_trees_key(&name, new_revision);
            let value = catalog::encode_tree_header_offset(new_header_offset);
            {
                let mut guard = engine.lock_page_store();
                let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
                let (new_tot_root, _outcome, _tot_copied) = tot.insert(&mut io, self.tree_of_trees_root, new_revision, &key, &value)?;
                self.tree_of_trees_root = new_tot_root;
            }

            if !copied.is_empty() {
                let cp = catalog::catalog_tree();
                let cp_key = catalog::copied_pages_key(new_revision, &name);
                let cp_value = catalog::encode_offsets(&copied);
                let mut guard = engine.lock_page_store();
                let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
                let (new_cp_root, _outcome, _cp_copied) = cp.insert(&mut io, self.copied_pages_root, new_revision, &cp_key, &cp_value)?;
                self.copied_pages_root = new_cp_root;
            }

            state.header = new_header;
            state.tree_header_offset = new_header_offset;
            self.trees.insert(name, state);
        }

        let prior = engine.committed_header();
        let new_global = crate::global_header::GlobalHeader {
            magic: prior.magic,
            format_version: prior.format_version,
            page_size: prior.page_size,
            revision: new_revision,
            free_list_head: self.free_list_head,
            tree_of_trees_root: self.tree_of_trees_root,
            copied_pages_root: self.copied_pages_root,
            txn_counter: prior.txn_counter + 1,
        };

        engine.write_global_header(&new_global)?;
        engine.publish(new_global, self.trees.clone());
        self.state = TxnState::Done;
        log::info!("committed revision {new_revision} ({} trees touched)", self.touched.len());
        Ok(new_revision)
    }

    /// Discards every write made on this transaction. No new revision is
    /// published; pages this transaction physically allocated are not
    /// returned to the free list (see DESIGN.md's note on abort-time space).
    pub fn abort(mut self) {
        self.state = TxnState::Done;
        log::debug!("aborted write transaction at base revision {}", self.base_revision);
    }

    /// Frees pages catalogued under a revision older than
    /// `min_live_revision` and prunes the matching copied-pages and
    /// tree-of-trees entries. Returns `(freed_pages, pruned_entries)`. Used
    /// only by [`crate::reclaim::Reclaimer`]; mutates this transaction's
    /// working roots but does not commit them.
    pub(crate) fn reclaim_pass(&mut self, min_live_revision: u64) -> Result<(usize, usize)> {
        let engine = self.engine;
        let new_revision = self.base_revision + 1;
        let cp = catalog::catalog_tree();
        let tot = catalog::catalog_tree();

        let entries = {
            let mut guard = engine.lock_page_store();
            let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
            crate::btree::collect_all_entries(&mut io, self.copied_pages_root)?
        };

        let mut freed_pages = 0usize;
        let mut pruned_entries = 0usize;
        for (key, value) in entries {
            let (revision, name) = catalog::decode_copied_pages_key(&key)?;
            if revision >= min_live_revision {
                continue;
            }
            let offsets = catalog::decode_offsets(&value)?;
            {
                let mut guard = engine.lock_page_store();
                let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
                for offset in &offsets {
                    io.free_now(*offset)?;
                }
            }
            freed_pages += offsets.len();

            {
                let mut guard = engine.lock_page_store();
                let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
                let (new_root, _outcome, _copied) = cp.delete(&mut io, self.copied_pages_root, new_revision, &key, None)?;
                self.copied_pages_root = new_root;
            }
            pruned_entries += 1;

            let tot_key = catalog::tree_of_trees_key(&name, revision);
            let mut guard = engine.lock_page_store();
            let mut io = PageIo::new(&mut guard, engine.cache(), &mut self.free_list_head);
            let (new_tot_root, _outcome, _copied) = tot.delete(&mut io, self.tree_of_trees_root, new_revision, &tot_key, None)?;
            self.tree_of_trees_root = new_tot_root;
        }

        Ok((freed_pages, pruned_entries))
    }
}
