//! Pluggable element codecs (spec.md §1 "serialization of individual
//! key/value types ... supplied by pluggable element codecs"). The core
//! stores keys and values as opaque byte strings; a codec gives them a
//! comparator and a byte encoding.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// A codec for one side (key or value) of a tree: encodes/decodes a typed
/// value to/from bytes and orders keys by byte comparison semantics.
pub trait ElementCodec: Send + Sync + std::fmt::Debug {
    /// Stable identifier stored in `TreeInfo` and resolved again at open time.
    fn id(&self) -> &'static str;

    /// Orders two already-encoded byte strings.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain byte strings, ordered lexicographically.
#[derive(Debug, Default)]
pub struct BytesCodec;

impl ElementCodec for BytesCodec {
    fn id(&self) -> &'static str {
        "bytes"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Big-endian `u64`, ordered numerically (which big-endian byte comparison
/// already gives for free).
#[derive(Debug, Default)]
pub struct U64BeCodec;

impl U64BeCodec {
    #[must_use]
    pub fn encode(v: u64) -> Vec<u8> {
        v.to_be_bytes().to_vec()
    }

    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<u64> {
        Some(u64::from_be_bytes(bytes.try_into().ok()?))
    }
}

impl ElementCodec for U64BeCodec {
    fn id(&self) -> &'static str {
        "u64-be"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Resolves codec identifiers (as stored in `TreeInfo`) to live codec
/// instances. Engine-wide registry, populated with the built-in codecs at
/// construction; applications may register their own.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Arc<dyn ElementCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut codecs: HashMap<&'static str, Arc<dyn ElementCodec>> = HashMap::new();
        codecs.insert("bytes", Arc::new(BytesCodec));
        codecs.insert("u64-be", Arc::new(U64BeCodec));
        Self { codecs }
    }
}

impl CodecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, codec: Arc<dyn ElementCodec>) {
        self.codecs.insert(codec.id(), codec);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn ElementCodec>> {
        self.codecs.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_be_orders_numerically() {
        let c = U64BeCodec;
        let a = U64BeCodec::encode(1);
        let b = U64BeCodec::encode(2);
        assert_eq!(c.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn registry_resolves_builtins() {
        let reg = CodecRegistry::new();
        assert!(reg.get("bytes").is_some());
        assert!(reg.get("u64-be").is_some());
        assert!(reg.get("nope").is_none());
    }
}
