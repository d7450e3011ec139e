use std::collections::BTreeMap;

use mavibot::config::{MavibotConfig, TreeConfig};
use mavibot::engine::Engine;
use proptest::prelude::*;
use tempfile::tempdir;

proptest! {
    #[test]
    fn cursor_order_matches_sorted_keys_for_any_insert_set(
        keys in proptest::collection::hash_set(proptest::collection::vec(any::<u8>(), 1..6), 1..60)
    ) {
        let dir = tempdir().unwrap();
        let engine = Engine::open(&dir.path().join("a.db"), MavibotConfig::default()).unwrap();
        let config = TreeConfig { page_nb_elem: 4, ..TreeConfig::default() };
        engine.create_tree("t", "bytes", "bytes", &config).unwrap();

        let mut txn = engine.begin_write();
        for k in &keys {
            txn.insert("t", k, k).unwrap();
        }
        txn.commit().unwrap();

        let txn = engine.begin_read(None);
        let mut cursor = txn.browse("t").unwrap();
        let mut walked = Vec::new();
        while cursor.next().unwrap() {
            walked.push(cursor.key().unwrap().to_vec());
        }

        let mut expected: Vec<Vec<u8>> = keys.into_iter().collect();
        expected.sort();
        prop_assert_eq!(walked, expected);
    }

    #[test]
    fn every_inserted_key_is_retrievable_and_nothing_else_is(
        entries in proptest::collection::vec((proptest::collection::vec(any::<u8>(), 1..4), proptest::collection::vec(any::<u8>(), 0..4)), 0..40)
    ) {
        let dir = tempdir().unwrap();
        let engine = Engine::open(&dir.path().join("a.db"), MavibotConfig::default()).unwrap();
        engine.create_tree("t", "bytes", "bytes", &TreeConfig::default()).unwrap();

        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let mut txn = engine.begin_write();
        for (k, v) in &entries {
            txn.insert("t", k, v).unwrap();
            model.insert(k.clone(), v.clone());
        }
        txn.commit().unwrap();

        let txn = engine.begin_read(None);
        for (k, v) in &model {
            prop_assert_eq!(txn.get("t", k).unwrap().as_ref(), Some(v));
        }
    }

    #[test]
    fn deleting_every_inserted_key_empties_the_tree(
        keys in proptest::collection::hash_set(proptest::collection::vec(any::<u8>(), 1..5), 1..40)
    ) {
        let dir = tempdir().unwrap();
        let engine = Engine::open(&dir.path().join("a.db"), MavibotConfig::default()).unwrap();
        let config = TreeConfig { page_nb_elem: 4, ..TreeConfig::default() };
        engine.create_tree("t", "bytes", "bytes", &config).unwrap();

        let keys: Vec<Vec<u8>> = keys.into_iter().collect();
        let mut txn = engine.begin_write();
        for k in &keys {
            txn.insert("t", k, k).unwrap();
        }
        txn.commit().unwrap();

        let mut txn = engine.begin_write();
        for k in &keys {
            let outcome = txn.delete("t", k, None).unwrap();
            prop_assert!(matches!(outcome, mavibot::btree::RemoveOutcome::Removed { .. }));
        }
        txn.commit().unwrap();

        let txn = engine.begin_read(None);
        let mut cursor = txn.browse("t").unwrap();
        prop_assert!(!cursor.next().unwrap());
    }
}
