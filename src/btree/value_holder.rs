//! `ValueHolder`: either an inline array of values, or the offset of an
//! embedded sub-B+tree once the array crosses `valueThresholdUp` (spec.md
//! §4.3 "Duplicates").

use crate::codec::primitives::{Reader, Writer};
use crate::error::Result;
use crate::page_store::NO_PAGE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueHolder {
    Inline(Vec<Vec<u8>>),
    SubTree { root: i64, revision: u64 },
}

const TAG_INLINE: u8 = 0;
const TAG_SUBTREE: u8 = 1;

impl ValueHolder {
    #[must_use]
    pub fn single(value: Vec<u8>) -> Self {
        Self::Inline(vec![value])
    }

    #[must_use]
    pub fn len(&self, sub_tree_len: impl Fn(i64) -> usize) -> usize {
        match self {
            Self::Inline(v) => v.len(),
            Self::SubTree { root, .. } => sub_tree_len(*root),
        }
    }

    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Self::Inline(values) => {
                w.u8(TAG_INLINE).u32(values.len() as u32);
                for v in values {
                    w.bytes(v);
                }
            }
            Self::SubTree { root, revision } => {
                w.u8(TAG_SUBTREE).i64(*root).u64(*revision);
            }
        }
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let tag = r.u8()?;
        match tag {
            TAG_INLINE => {
                let count = r.u32()? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(r.bytes()?);
                }
                Ok(Self::Inline(values))
            }
            TAG_SUBTREE => {
                let root = r.i64()?;
                let revision = r.u64()?;
                Ok(Self::SubTree { root, revision })
            }
            other => Err(crate::error::MavibotError::Corruption(format!(
                "unknown value holder tag {other}"
            ))),
        }
    }
}

impl Default for ValueHolder {
    fn default() -> Self {
        Self::Inline(Vec::new())
    }
}

#[must_use]
pub fn is_null_subtree(root: i64) -> bool {
    root == NO_PAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_roundtrip() {
        let h = ValueHolder::Inline(vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(ValueHolder::decode(&h.encode()).unwrap(), h);
    }

    #[test]
    fn subtree_roundtrip() {
        let h = ValueHolder::SubTree { root: 42, revision: 3 };
        assert_eq!(ValueHolder::decode(&h.encode()).unwrap(), h);
    }
}
