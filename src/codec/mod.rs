//! Logical page serialization: the wire layout of leaves, nodes, tree
//! headers, and tree info (spec.md §4.2), plus the pluggable element codecs
//! that give keys and values a comparator and byte encoding.

pub mod element;
pub mod primitives;
pub mod types;

pub use element::{BytesCodec, CodecRegistry, ElementCodec, U64BeCodec};
pub use primitives::{decode_pos, find_pos};
pub use types::{Leaf, Node, TreeHeader, TreeInfo, TreeKind};
