use mavibot::config::{MavibotConfig, TreeConfig};
use mavibot::engine::Engine;
use mavibot::btree::{PutOutcome, RemoveOutcome};
use tempfile::tempdir;

fn open(dir: &std::path::Path, name: &str) -> Engine {
    let engine = Engine::open(&dir.join(name), MavibotConfig::default()).unwrap();
    engine.create_tree("t", "bytes", "bytes", &TreeConfig::default()).unwrap();
    engine
}

#[test]
fn get_on_an_empty_tree_returns_none() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path(), "a.db");
    let txn = engine.begin_read(None);
    assert_eq!(txn.get("t", b"missing").unwrap(), None);
}

#[test]
fn insert_then_get_then_update_then_delete() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path(), "a.db");

    let mut txn = engine.begin_write();
    assert!(matches!(txn.insert("t", b"k", b"v1").unwrap(), PutOutcome::Inserted));
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    assert_eq!(txn.get("t", b"k").unwrap().as_deref(), Some(b"v1".as_slice()));
    drop(txn);

    let mut txn = engine.begin_write();
    assert!(matches!(txn.insert("t", b"k", b"v2").unwrap(), PutOutcome::Updated { .. }));
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    assert_eq!(txn.get("t", b"k").unwrap().as_deref(), Some(b"v2".as_slice()));
    drop(txn);

    let mut txn = engine.begin_write();
    assert!(matches!(txn.delete("t", b"k", None).unwrap(), RemoveOutcome::Removed { .. }));
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    assert_eq!(txn.get("t", b"k").unwrap(), None);
}

#[test]
fn deleting_an_absent_key_reports_not_present() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path(), "a.db");
    let mut txn = engine.begin_write();
    assert!(matches!(txn.delete("t", b"ghost", None).unwrap(), RemoveOutcome::NotPresent));
    txn.abort();
}

#[test]
fn a_tree_survives_reopening_the_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.db");
    {
        let engine = Engine::open(&path, MavibotConfig::default()).unwrap();
        engine.create_tree("accounts", "bytes", "bytes", &TreeConfig::default()).unwrap();
        let mut txn = engine.begin_write();
        for (k, v) in [("alice", "100"), ("bob", "50"), ("carol", "75")] {
            txn.insert("accounts", k.as_bytes(), v.as_bytes()).unwrap();
        }
        txn.commit().unwrap();
    }

    let engine = Engine::open(&path, MavibotConfig::default()).unwrap();
    assert!(engine.has_tree("accounts"));
    let txn = engine.begin_read(None);
    assert_eq!(txn.get("accounts", b"alice").unwrap().as_deref(), Some(b"100".as_slice()));
    assert_eq!(txn.get("accounts", b"bob").unwrap().as_deref(), Some(b"50".as_slice()));
    assert_eq!(txn.get("accounts", b"carol").unwrap().as_deref(), Some(b"75".as_slice()));
}

#[test]
fn creating_the_same_tree_twice_is_an_error() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path(), "a.db");
    let err = engine.create_tree("t", "bytes", "bytes", &TreeConfig::default()).unwrap_err();
    assert!(matches!(err, mavibot::MavibotError::TreeAlreadyManaged(name) if name == "t"));
}

#[test]
fn operating_on_an_unknown_tree_is_an_error() {
    let dir = tempdir().unwrap();
    let engine = open(dir.path(), "a.db");
    let txn = engine.begin_read(None);
    let err = txn.get("nope", b"k").unwrap_err();
    assert!(matches!(err, mavibot::MavibotError::TreeNotFound(name) if name == "nope"));
}
