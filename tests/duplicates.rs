//! Duplicate-value promotion/demotion: an inline array of values under a key
//! is promoted to an embedded sub-tree once it grows past
//! `value_threshold_up`, and demoted back once it shrinks to
//! `value_threshold_low`.

use mavibot::config::{MavibotConfig, TreeConfig};
use mavibot::engine::Engine;
use tempfile::tempdir;

fn duplicate_tree(dir: &std::path::Path) -> Engine {
    let engine = Engine::open(&dir.join("a.db"), MavibotConfig::default()).unwrap();
    let config = TreeConfig {
        allow_duplicates: true,
        value_threshold_up: 3,
        value_threshold_low: 1,
        ..TreeConfig::default()
    };
    engine.create_tree("t", "bytes", "bytes", &config).unwrap();
    engine
}

#[test]
fn all_values_sees_every_duplicate_before_and_after_promotion() {
    let dir = tempdir().unwrap();
    let engine = duplicate_tree(dir.path());

    let mut txn = engine.begin_write();
    for v in ["v1", "v2", "v3", "v4", "v5"] {
        txn.insert("t", b"k", v.as_bytes()).unwrap();
    }
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    let mut values: Vec<String> =
        txn.all_values("t", b"k").unwrap().into_iter().map(|v| String::from_utf8(v).unwrap()).collect();
    values.sort();
    assert_eq!(values, vec!["v1", "v2", "v3", "v4", "v5"]);
}

#[test]
fn reinserting_the_same_duplicate_value_is_a_no_op() {
    let dir = tempdir().unwrap();
    let engine = duplicate_tree(dir.path());

    let mut txn = engine.begin_write();
    txn.insert("t", b"k", b"v1").unwrap();
    txn.commit().unwrap();

    let mut txn = engine.begin_write();
    let outcome = txn.insert("t", b"k", b"v1").unwrap();
    assert!(matches!(outcome, mavibot::btree::PutOutcome::Exists));
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    assert_eq!(txn.all_values("t", b"k").unwrap().len(), 1);
}

#[test]
fn demoting_back_to_inline_and_deleting_the_last_value_removes_the_key() {
    let dir = tempdir().unwrap();
    let engine = duplicate_tree(dir.path());

    let mut txn = engine.begin_write();
    for v in ["v1", "v2", "v3", "v4"] {
        txn.insert("t", b"k", v.as_bytes()).unwrap();
    }
    txn.commit().unwrap();
    assert_eq!(engine.begin_read(None).all_values("t", b"k").unwrap().len(), 4);

    let mut txn = engine.begin_write();
    for v in ["v4", "v3"] {
        txn.delete("t", b"k", Some(v.as_bytes())).unwrap();
    }
    txn.commit().unwrap();
    // Back down to value_threshold_low (1 survives plus v1, v2 => 2 left, still above low=1).
    assert_eq!(engine.begin_read(None).all_values("t", b"k").unwrap().len(), 2);

    let mut txn = engine.begin_write();
    txn.delete("t", b"k", Some(b"v2")).unwrap();
    txn.commit().unwrap();
    assert_eq!(engine.begin_read(None).all_values("t", b"k").unwrap(), vec![b"v1".to_vec()]);

    let mut txn = engine.begin_write();
    txn.delete("t", b"k", Some(b"v1")).unwrap();
    txn.commit().unwrap();
    assert_eq!(engine.begin_read(None).get("t", b"k").unwrap(), None);
}

#[test]
fn deleting_a_value_that_was_never_inserted_reports_not_present() {
    let dir = tempdir().unwrap();
    let engine = duplicate_tree(dir.path());

    let mut txn = engine.begin_write();
    txn.insert("t", b"k", b"v1").unwrap();
    txn.commit().unwrap();

    let mut txn = engine.begin_write();
    let outcome = txn.delete("t", b"k", Some(b"ghost")).unwrap();
    assert!(matches!(outcome, mavibot::btree::RemoveOutcome::NotPresent));
    txn.abort();
}
