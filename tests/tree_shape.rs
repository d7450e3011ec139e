//! Exercises enough inserts to force node splits and a taller tree, then
//! enough deletes to force merges/borrows, checking every key survives the
//! round trip in order via the cursor.

use mavibot::config::{MavibotConfig, TreeConfig};
use mavibot::engine::Engine;
use tempfile::tempdir;

fn small_fan_out_tree(dir: &std::path::Path) -> Engine {
    let engine = Engine::open(&dir.join("a.db"), MavibotConfig::default()).unwrap();
    let config = TreeConfig { page_nb_elem: 4, ..TreeConfig::default() };
    engine.create_tree("t", "bytes", "bytes", &config).unwrap();
    engine
}

fn collect_forward(txn: &mavibot::ReadTxn<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut cursor = txn.browse("t").unwrap();
    let mut out = Vec::new();
    while cursor.next().unwrap() {
        out.push(cursor.entry().unwrap());
    }
    out
}

#[test]
fn inserting_nine_keys_keeps_cursor_order_with_a_small_fan_out() {
    let dir = tempdir().unwrap();
    let engine = small_fan_out_tree(dir.path());

    let keys: Vec<String> = (0..9).map(|i| format!("k{i:02}")).collect();
    let mut txn = engine.begin_write();
    for k in &keys {
        txn.insert("t", k.as_bytes(), k.as_bytes()).unwrap();
    }
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    let entries = collect_forward(&txn);
    let mut expected = keys.clone();
    expected.sort();
    let got: Vec<String> = entries.into_iter().map(|(k, _)| String::from_utf8(k).unwrap()).collect();
    assert_eq!(got, expected);
}

#[test]
fn deleting_down_to_a_handful_of_keys_preserves_order_and_rebalances() {
    let dir = tempdir().unwrap();
    let engine = small_fan_out_tree(dir.path());

    let keys: Vec<String> = (0..20).map(|i| format!("k{i:02}")).collect();
    let mut txn = engine.begin_write();
    for k in &keys {
        txn.insert("t", k.as_bytes(), k.as_bytes()).unwrap();
    }
    txn.commit().unwrap();

    // Delete every third key, forcing borrows and merges along the way.
    let mut txn = engine.begin_write();
    for k in keys.iter().step_by(3) {
        txn.delete("t", k.as_bytes(), None).unwrap();
    }
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    let remaining: Vec<String> =
        keys.iter().enumerate().filter(|(i, _)| i % 3 != 0).map(|(_, k)| k.clone()).collect();
    let got: Vec<String> = collect_forward(&txn).into_iter().map(|(k, _)| String::from_utf8(k).unwrap()).collect();
    assert_eq!(got, remaining);

    for k in keys.iter().step_by(3) {
        assert_eq!(txn.get("t", k.as_bytes()).unwrap(), None);
    }
}

#[test]
fn cursor_walks_backward_in_reverse_order() {
    let dir = tempdir().unwrap();
    let engine = small_fan_out_tree(dir.path());

    let keys: Vec<String> = (0..12).map(|i| format!("k{i:02}")).collect();
    let mut txn = engine.begin_write();
    for k in &keys {
        txn.insert("t", k.as_bytes(), k.as_bytes()).unwrap();
    }
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    let mut cursor = txn.browse("t").unwrap();
    cursor.after_last();
    let mut got = Vec::new();
    while cursor.prev().unwrap() {
        got.push(String::from_utf8(cursor.key().unwrap().to_vec()).unwrap());
    }
    let mut expected = keys.clone();
    expected.sort();
    expected.reverse();
    assert_eq!(got, expected);
}

#[test]
fn browse_from_seeks_to_the_first_key_at_or_after() {
    let dir = tempdir().unwrap();
    let engine = small_fan_out_tree(dir.path());

    let mut txn = engine.begin_write();
    for k in ["a", "c", "e", "g", "i"] {
        txn.insert("t", k.as_bytes(), k.as_bytes()).unwrap();
    }
    txn.commit().unwrap();

    let txn = engine.begin_read(None);
    let mut cursor = txn.browse_from("t", b"d").unwrap();
    assert_eq!(cursor.key().unwrap(), b"e");
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.key().unwrap(), b"g");

    // Seeking past the last key lands on AFTER_LAST.
    let mut cursor = txn.browse_from("t", b"z").unwrap();
    assert!(!cursor.has_next().unwrap());
}
