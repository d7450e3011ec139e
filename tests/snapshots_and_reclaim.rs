//! Snapshot isolation across concurrent readers, and reclamation's
//! interaction with snapshots still pinned to a superseded revision.

use std::time::Duration;

use mavibot::config::{MavibotConfig, TreeConfig};
use mavibot::engine::Engine;
use tempfile::tempdir;

fn store(dir: &std::path::Path) -> Engine {
    let engine = Engine::open(&dir.join("a.db"), MavibotConfig::default()).unwrap();
    engine.create_tree("t", "bytes", "bytes", &TreeConfig::default()).unwrap();
    engine
}

#[test]
fn a_read_snapshot_does_not_see_writes_committed_after_it_opened() {
    let dir = tempdir().unwrap();
    let engine = store(dir.path());

    let mut txn = engine.begin_write();
    txn.insert("t", b"a", b"1").unwrap();
    txn.commit().unwrap();

    let snapshot = engine.begin_read(None);
    assert_eq!(snapshot.get("t", b"a").unwrap().as_deref(), Some(b"1".as_slice()));

    let mut txn = engine.begin_write();
    txn.insert("t", b"a", b"2").unwrap();
    txn.insert("t", b"b", b"new").unwrap();
    txn.commit().unwrap();

    // The old snapshot is pinned: still "1", and still unaware of "b".
    assert_eq!(snapshot.get("t", b"a").unwrap().as_deref(), Some(b"1".as_slice()));
    assert_eq!(snapshot.get("t", b"b").unwrap(), None);

    // A fresh snapshot sees the new revision.
    let fresh = engine.begin_read(None);
    assert_eq!(fresh.get("t", b"a").unwrap().as_deref(), Some(b"2".as_slice()));
    assert_eq!(fresh.get("t", b"b").unwrap().as_deref(), Some(b"new".as_slice()));
}

#[test]
fn writers_serialize_and_each_commit_publishes_the_next_revision() {
    let dir = tempdir().unwrap();
    let engine = store(dir.path());

    for i in 0..5u32 {
        let mut txn = engine.begin_write();
        txn.insert("t", format!("k{i}").as_bytes(), b"v").unwrap();
        let revision = txn.commit().unwrap();
        assert_eq!(revision, u64::from(i) + 1);
    }
    assert_eq!(engine.stats().revision, 5);
}

#[test]
fn closing_a_snapshot_early_releases_it_before_its_timeout() {
    let dir = tempdir().unwrap();
    let engine = store(dir.path());
    assert_eq!(engine.stats().open_snapshots, 0);

    let snapshot = engine.begin_read(None);
    assert_eq!(engine.stats().open_snapshots, 1);
    snapshot.close();
    assert_eq!(engine.stats().open_snapshots, 0);
}

#[test]
fn an_expired_snapshot_is_evicted_by_the_timekeeper_and_further_reads_fail() {
    let dir = tempdir().unwrap();
    let engine = store(dir.path());

    let snapshot = engine.begin_read(Some(Duration::from_millis(50)));
    std::thread::sleep(Duration::from_millis(1200));

    let err = snapshot.get("t", b"a").unwrap_err();
    assert!(matches!(err, mavibot::MavibotError::BadTransactionState(_)));
}

#[test]
fn reclaim_waits_for_every_snapshot_pinning_a_superseded_revision_to_close() {
    let dir = tempdir().unwrap();
    let engine = store(dir.path());

    let mut txn = engine.begin_write();
    txn.insert("t", b"a", b"1").unwrap();
    txn.commit().unwrap();

    let oldest = engine.begin_read(None);

    let mut txn = engine.begin_write();
    txn.insert("t", b"a", b"2").unwrap();
    txn.commit().unwrap();

    let middle = engine.begin_read(None);

    let mut txn = engine.begin_write();
    txn.insert("t", b"a", b"3").unwrap();
    txn.commit().unwrap();

    assert_eq!(engine.reclaim().unwrap().freed_pages, 0, "oldest snapshot still pins revision 1's pages");

    drop(oldest);
    let report = engine.reclaim().unwrap();
    assert!(report.freed_pages > 0, "revision 1's superseded pages are now reclaimable");

    assert_eq!(middle.get("t", b"a").unwrap().as_deref(), Some(b"2".as_slice()));
}
