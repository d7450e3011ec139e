//! Key/value encodings for the two internal catalog B+trees (spec.md §3):
//! the **tree-of-trees**, mapping `(name, revision) -> TreeHeader offset`,
//! and the **copied-pages** index, mapping `(revision, name) -> [offsets]`.
//! Both are ordinary [`crate::btree::Tree`]s over the same page file; this
//! module only owns their key/value byte layout and fan-out/codec
//! configuration.

use std::sync::Arc;

use crate::btree::Tree;
use crate::codec::BytesCodec;
use crate::error::{MavibotError, Result};

pub const CATALOG_FAN_OUT: usize = 32;

/// Pseudo tree names used to address the two catalog trees themselves
/// wherever a tree name is otherwise expected (currently unused by the
/// copied-pages bookkeeping — see DESIGN.md's note on catalog self-reclaim).
pub const TREE_OF_TREES_NAME: &str = "__tree_of_trees__";
pub const COPIED_PAGES_NAME: &str = "__copied_pages__";

/// Configuration shared by both catalog trees: plain byte keys, no
/// duplicates (neither catalog has a legitimate use for a duplicate value —
/// see DESIGN.md's resolution of spec.md's flagged open question).
#[must_use]
pub fn catalog_tree() -> Tree {
    Tree {
        fan_out: CATALOG_FAN_OUT,
        allow_duplicates: false,
        value_threshold_up: 0,
        value_threshold_low: 0,
        key_codec: Arc::new(BytesCodec) as Arc<dyn crate::codec::ElementCodec>,
        value_codec: Arc::new(BytesCodec) as Arc<dyn crate::codec::ElementCodec>,
    }
}

/// `(name, revision)` key for the tree-of-trees, ordered by name then by
/// revision (tree names must not contain a NUL byte).
#[must_use]
pub fn tree_of_trees_key(name: &str, revision: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1 + 8);
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out.extend_from_slice(&revision.to_be_bytes());
    out
}

/// Decodes a `tree_of_trees_key` back into its name and revision.
pub fn decode_tree_of_trees_key(bytes: &[u8]) -> Result<(String, u64)> {
    let sep = bytes
        .iter()
        .rposition(|&b| b == 0)
        .ok_or_else(|| MavibotError::Corruption("malformed tree-of-trees key".into()))?;
    let name = String::from_utf8(bytes[..sep].to_vec())
        .map_err(|e| MavibotError::Corruption(format!("tree-of-trees key not utf8: {e}")))?;
    let rev_bytes: [u8; 8] = bytes[sep + 1..]
        .try_into()
        .map_err(|_| MavibotError::Corruption("malformed tree-of-trees revision".into()))?;
    Ok((name, u64::from_be_bytes(rev_bytes)))
}

/// `(revision, name)` key for the copied-pages index, ordered by revision
/// first so the `Reclaimer` can scan in revision order cheaply.
#[must_use]
pub fn copied_pages_key(revision: u64, name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 1 + name.len());
    out.extend_from_slice(&revision.to_be_bytes());
    out.push(0);
    out.extend_from_slice(name.as_bytes());
    out
}

pub fn decode_copied_pages_key(bytes: &[u8]) -> Result<(u64, String)> {
    if bytes.len() < 9 {
        return Err(MavibotError::Corruption("malformed copied-pages key".into()));
    }
    let rev_bytes: [u8; 8] = bytes[0..8].try_into().unwrap();
    let revision = u64::from_be_bytes(rev_bytes);
    let name = String::from_utf8(bytes[9..].to_vec())
        .map_err(|e| MavibotError::Corruption(format!("copied-pages key not utf8: {e}")))?;
    Ok((revision, name))
}

/// Encodes a list of freed page offsets as the copied-pages value.
#[must_use]
pub fn encode_offsets(offsets: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + offsets.len() * 8);
    out.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for o in offsets {
        out.extend_from_slice(&o.to_be_bytes());
    }
    out
}

/// Encodes the single `TreeHeader` record offset stored as a tree-of-trees
/// value.
#[must_use]
pub fn encode_tree_header_offset(offset: i64) -> Vec<u8> {
    offset.to_be_bytes().to_vec()
}

pub fn decode_tree_header_offset(bytes: &[u8]) -> Result<i64> {
    let chunk: [u8; 8] =
        bytes.try_into().map_err(|_| MavibotError::Corruption("malformed tree-header offset value".into()))?;
    Ok(i64::from_be_bytes(chunk))
}

pub fn decode_offsets(bytes: &[u8]) -> Result<Vec<i64>> {
    if bytes.len() < 4 {
        return Err(MavibotError::Corruption("malformed copied-pages value".into()));
    }
    let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut out = Vec::with_capacity(count);
    let mut pos = 4;
    for _ in 0..count {
        let chunk: [u8; 8] = bytes
            .get(pos..pos + 8)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| MavibotError::Corruption("truncated copied-pages value".into()))?;
        out.push(i64::from_be_bytes(chunk));
        pos += 8;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_of_trees_key_roundtrips() {
        let key = tree_of_trees_key("accounts", 42);
        assert_eq!(decode_tree_of_trees_key(&key).unwrap(), ("accounts".to_string(), 42));
    }

    #[test]
    fn copied_pages_key_roundtrips() {
        let key = copied_pages_key(7, "accounts");
        assert_eq!(decode_copied_pages_key(&key).unwrap(), (7, "accounts".to_string()));
    }

    #[test]
    fn offsets_roundtrip() {
        let offsets = vec![1, 2, 3, -1];
        assert_eq!(decode_offsets(&encode_offsets(&offsets)).unwrap(), offsets);
    }

    #[test]
    fn tree_of_trees_keys_order_by_name_then_revision() {
        let a1 = tree_of_trees_key("a", 1);
        let a2 = tree_of_trees_key("a", 2);
        let b1 = tree_of_trees_key("b", 1);
        assert!(a1 < a2);
        assert!(a2 < b1);
    }
}
