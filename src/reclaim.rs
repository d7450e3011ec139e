//! The Reclaimer (spec.md §4.5): scans the copied-pages catalog against the
//! oldest revision any live snapshot still needs and frees what nothing can
//! reach anymore. Shaped on the teacher's background-sweep pattern in
//! `cache/policy.rs::purge_expired` (scan a bookkeeping structure, act on
//! entries past a threshold, run periodically from a dedicated call site) but
//! driven as its own write transaction rather than a lock-free sweep, since
//! freeing a page has to be atomic with removing its catalog entry.

use crate::engine::Engine;
use crate::error::Result;

/// What one reclamation pass did.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReclaimReport {
    /// Pages returned to the free list.
    pub freed_pages: usize,
    /// Copied-pages (and matching tree-of-trees) catalog entries pruned.
    pub pruned_entries: usize,
}

/// Runs one reclamation pass against an open [`Engine`].
pub struct Reclaimer<'e> {
    engine: &'e Engine,
}

impl<'e> Reclaimer<'e> {
    #[must_use]
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Frees every page catalogued under a revision no live snapshot can
    /// still read, and prunes the now-unreachable catalog entries. Runs as
    /// its own write transaction; a no-op pass commits nothing.
    ///
    /// # Errors
    /// Propagates I/O and corruption errors encountered while scanning the
    /// copied-pages catalog or committing the result.
    pub fn run(self) -> Result<ReclaimReport> {
        let min_live_revision = self.engine.min_live_revision();
        let mut txn = self.engine.begin_write();
        let (freed_pages, pruned_entries) = txn.reclaim_pass(min_live_revision)?;

        if freed_pages == 0 && pruned_entries == 0 {
            txn.abort();
        } else {
            txn.commit()?;
        }

        log::info!(
            "reclaim: freed {freed_pages} pages, pruned {pruned_entries} catalog entries (min_live_revision={min_live_revision})"
        );
        Ok(ReclaimReport { freed_pages, pruned_entries })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use crate::config::{MavibotConfig, TreeConfig};
    use crate::engine::Engine;

    #[test]
    fn reclaim_is_a_no_op_on_a_fresh_store() {
        let file = NamedTempFile::new().unwrap();
        let engine = Engine::open(file.path(), MavibotConfig::default()).unwrap();
        engine.create_tree("t", "bytes", "bytes", &TreeConfig::default()).unwrap();

        let report = engine.reclaim().unwrap();
        assert_eq!(report.freed_pages, 0);
        assert_eq!(report.pruned_entries, 0);
    }

    #[test]
    fn reclaim_frees_pages_superseded_before_the_oldest_live_snapshot() {
        let file = NamedTempFile::new().unwrap();
        let engine = Engine::open(file.path(), MavibotConfig::default()).unwrap();
        engine.create_tree("t", "bytes", "bytes", &TreeConfig::default()).unwrap();

        let mut txn = engine.begin_write();
        txn.insert("t", b"a", b"1").unwrap();
        txn.commit().unwrap();

        let mut txn = engine.begin_write();
        txn.insert("t", b"a", b"2").unwrap();
        txn.commit().unwrap();

        // No open snapshots: min_live_revision is the committed revision, so
        // everything older is reclaimable.
        let report = engine.reclaim().unwrap();
        assert!(report.freed_pages > 0);

        let txn = engine.begin_read(None);
        assert_eq!(txn.get("t", b"a").unwrap().as_deref(), Some(b"2".as_slice()));
    }

    #[test]
    fn reclaim_leaves_pages_a_live_snapshot_still_needs() {
        let file = NamedTempFile::new().unwrap();
        let engine = Engine::open(file.path(), MavibotConfig::default()).unwrap();
        engine.create_tree("t", "bytes", "bytes", &TreeConfig::default()).unwrap();

        let mut txn = engine.begin_write();
        txn.insert("t", b"a", b"1").unwrap();
        txn.commit().unwrap();

        let snapshot = engine.begin_read(None);

        let mut txn = engine.begin_write();
        txn.insert("t", b"a", b"2").unwrap();
        txn.commit().unwrap();

        let report = engine.reclaim().unwrap();
        assert_eq!(report.freed_pages, 0, "the open snapshot still pins the superseded page");

        assert_eq!(snapshot.get("t", b"a").unwrap().as_deref(), Some(b"1".as_slice()));
        drop(snapshot);

        let report = engine.reclaim().unwrap();
        assert!(report.freed_pages > 0);
    }
}
