//! The four WAL-observable logical objects (spec.md §4.2) and their byte
//! layouts, grounded on the teacher's `recovery/wasp/tree.rs::CowNode`
//! (enum-of-leaf-or-internal) but generalized to the spec's explicit wire
//! format instead of `bincode`.

use super::primitives::{Reader, Writer};
use crate::error::Result;
use crate::page_store::NO_PAGE;

/// A B+tree leaf page: sorted keys paired with opaque value-holder bytes.
/// No child pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub revision: u64,
    pub keys: Vec<Vec<u8>>,
    /// Already-encoded `ValueHolder` bytes, one per key.
    pub values: Vec<Vec<u8>>,
}

impl Leaf {
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u64(self.revision).u32(self.keys.len() as u32);
        for (k, v) in self.keys.iter().zip(self.values.iter()) {
            w.bytes(k).bytes(v);
        }
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let revision = r.u64()?;
        let count = r.u32()? as usize;
        let mut keys = Vec::with_capacity(count);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(r.bytes()?);
            values.push(r.bytes()?);
        }
        Ok(Self { revision, keys, values })
    }
}

/// A B+tree internal node: `count` pivot keys route to `count + 1` children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub revision: u64,
    pub keys: Vec<Vec<u8>>,
    /// Page offsets (or pending ids) of children; `children.len() == keys.len() + 1`.
    pub children: Vec<i64>,
}

impl Node {
    #[must_use]
    pub fn pivot_count(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u64(self.revision).u32(self.keys.len() as u32);
        for (i, k) in self.keys.iter().enumerate() {
            w.i64(self.children[i]).bytes(k);
        }
        w.i64(*self.children.last().unwrap_or(&NO_PAGE));
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let revision = r.u64()?;
        let count = r.u32()? as usize;
        let mut keys = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(count + 1);
        for _ in 0..count {
            children.push(r.i64()?);
            keys.push(r.bytes()?);
        }
        children.push(r.i64()?);
        Ok(Self { revision, keys, children })
    }
}

/// Mutable per-revision descriptor of a live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub revision: u64,
    pub element_count: u64,
    pub root_offset: i64,
    pub tree_info_offset: i64,
}

impl TreeHeader {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u64(self.revision).u64(self.element_count).i64(self.root_offset).i64(self.tree_info_offset);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        Ok(Self {
            revision: r.u64()?,
            element_count: r.u64()?,
            root_offset: r.i64()?,
            tree_info_offset: r.i64()?,
        })
    }
}

/// Tree kind, used to distinguish user trees from the two catalog trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    User = 0,
    TreeOfTrees = 1,
    CopiedPages = 2,
}

impl TreeKind {
    #[must_use]
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::TreeOfTrees,
            2 => Self::CopiedPages,
            _ => Self::User,
        }
    }
}

/// Immutable per-tree metadata, written once at tree creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeInfo {
    pub fan_out: u32,
    pub name: String,
    pub key_codec_id: String,
    pub value_codec_id: String,
    pub kind: TreeKindRepr,
    pub allow_duplicates: bool,
    pub value_threshold_up: u32,
    pub value_threshold_low: u32,
}

/// `TreeKind` is not `Copy`-friendly over the wire tag alone; this mirrors it
/// without re-deriving traits on the enum above.
pub type TreeKindRepr = u8;

impl TreeInfo {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u32(self.fan_out).string(&self.name).string(&self.key_codec_id).string(&self.value_codec_id);
        w.u8(self.kind);
        w.u8(u8::from(self.allow_duplicates));
        w.u32(self.value_threshold_up).u32(self.value_threshold_low);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let fan_out = r.u32()?;
        let name = r.string()?;
        let key_codec_id = r.string()?;
        let value_codec_id = r.string()?;
        let kind = r.u8()?;
        let allow_duplicates = r.u8()? != 0;
        let value_threshold_up = r.u32()?;
        let value_threshold_low = r.u32()?;
        Ok(Self {
            fan_out,
            name,
            key_codec_id,
            value_codec_id,
            kind,
            allow_duplicates,
            value_threshold_up,
            value_threshold_low,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_roundtrip() {
        let leaf = Leaf {
            revision: 3,
            keys: vec![b"a".to_vec(), b"b".to_vec()],
            values: vec![b"1".to_vec(), b"2".to_vec()],
        };
        let encoded = leaf.encode();
        assert_eq!(Leaf::decode(&encoded).unwrap(), leaf);
    }

    #[test]
    fn node_roundtrip() {
        let node = Node { revision: 1, keys: vec![b"m".to_vec()], children: vec![10, 20] };
        let encoded = node.encode();
        assert_eq!(Node::decode(&encoded).unwrap(), node);
    }

    #[test]
    fn tree_header_roundtrip() {
        let h = TreeHeader { revision: 5, element_count: 9, root_offset: 100, tree_info_offset: 8 };
        assert_eq!(TreeHeader::decode(&h.encode()).unwrap(), h);
    }

    #[test]
    fn tree_info_roundtrip() {
        let info = TreeInfo {
            fan_out: 16,
            name: "accounts".to_string(),
            key_codec_id: "bytes".to_string(),
            value_codec_id: "u64-be".to_string(),
            kind: TreeKind::User as u8,
            allow_duplicates: true,
            value_threshold_up: 8,
            value_threshold_low: 1,
        };
        assert_eq!(TreeInfo::decode(&info.encode()).unwrap(), info);
    }
}
