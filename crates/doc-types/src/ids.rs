use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fingerprint::Fingerprint;
use crate::source::SourceHandle;

/// Opaque identity of a processed document version, deterministically
/// derived from `(normalized source, content fingerprint, options
/// fingerprint)`. Byte-identical content processed with identical options
/// always yields the same `DocumentId`; changing either component yields a
/// new one (spec §3, invariant I2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn derive(source: &SourceHandle, content_fp: Fingerprint, options_fp: Fingerprint) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.normalized().as_bytes());
        hasher.update(b"\0");
        hasher.update(content_fp.0);
        hasher.update(b"\0");
        hasher.update(options_fp.0);
        let digest = hasher.finalize();
        DocumentId(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(DocumentId, ordinal)`. Ordinals are a dense zero-based sequence;
/// ordering is meaningful for reconstruction only, never for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub doc_id: DocumentId,
    pub ordinal: u32,
}

impl ChunkId {
    pub fn new(doc_id: DocumentId, ordinal: u32) -> Self {
        ChunkId { doc_id, ordinal }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.doc_id, self.ordinal)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_content_and_options_yield_same_id() {
        let source = SourceHandle::parse("/tmp/a.pdf");
        let fp = Fingerprint::of(b"content", None, None);
        let ofp = Fingerprint::of(b"options", None, None);
        let a = DocumentId::derive(&source, fp, ofp);
        let b = DocumentId::derive(&source, fp, ofp);
        assert_eq!(a, b);
    }

    #[test]
    fn changing_options_changes_id() {
        let source = SourceHandle::parse("/tmp/a.pdf");
        let fp = Fingerprint::of(b"content", None, None);
        let ofp1 = Fingerprint::of(b"options1", None, None);
        let ofp2 = Fingerprint::of(b"options2", None, None);
        assert_ne!(DocumentId::derive(&source, fp, ofp1), DocumentId::derive(&source, fp, ofp2));
    }
}
