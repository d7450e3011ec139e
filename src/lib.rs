//! Mavibot: an embedded, single-file, persistent key/value store built
//! around a copy-on-write B+tree (spec.md §1). One writer at a time, any
//! number of concurrent readers pinned to the revision they opened against,
//! and reclamation of superseded pages once no live reader still needs them.
#![forbid(unsafe_code)]

pub mod btree;
pub mod cache;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod global_header;
pub mod logging;
pub mod page_store;
pub mod reclaim;
pub mod txn;
pub mod utils;

pub use config::{MavibotConfig, TreeConfig};
pub use cursor::Cursor;
pub use engine::{Engine, EngineStats};
pub use error::{MavibotError, Result};
pub use reclaim::{Reclaimer, ReclaimReport};
pub use txn::{ReadTxn, WriteTxn};

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn open_create_tree_write_read_reopen() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        {
            let engine = Engine::open(&path, MavibotConfig::default()).unwrap();
            engine.create_tree("accounts", "bytes", "bytes", &TreeConfig::default()).unwrap();
            let mut txn = engine.begin_write();
            txn.insert("accounts", b"alice", b"100").unwrap();
            txn.insert("accounts", b"bob", b"50").unwrap();
            txn.commit().unwrap();
        }

        let engine = Engine::open(&path, MavibotConfig::default()).unwrap();
        assert!(engine.has_tree("accounts"));
        let txn = engine.begin_read(None);
        assert_eq!(txn.get("accounts", b"alice").unwrap().as_deref(), Some(b"100".as_slice()));
        assert_eq!(txn.get("accounts", b"bob").unwrap().as_deref(), Some(b"50".as_slice()));
        assert_eq!(txn.get("accounts", b"carol").unwrap(), None);
    }
}
