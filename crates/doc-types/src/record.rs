use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::chunk::Pair;
use crate::fingerprint::Fingerprint;
use crate::ids::{ChunkId, DocumentId};
use crate::source::SourceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Pending,
    Parsing,
    Indexing,
    Ready,
    Failed,
    Removing,
}

/// Canonical per-document state held by the Document Registry (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: DocumentId,
    pub source: SourceHandle,
    pub fingerprint: Fingerprint,
    pub options_fp: Fingerprint,
    pub chunk_ids: Vec<ChunkId>,
    pub pairs: Vec<Pair>,
    pub vector_indexed: bool,
    pub keyword_indexed: bool,
    /// The extraction prompt used to produce `pairs`/chunk text for this
    /// document version. Kept alongside `options_fp` (which only records a
    /// hash) so that repair (spec §4.6) can reconstruct the exact Artifact
    /// Cache key for a `Corrupt` document without re-deriving it from a
    /// `ProcessingOptions` value it no longer has in hand.
    #[serde(default)]
    pub extraction_prompt: String,
    /// Declared size/mtime observed the last time this source was read
    /// (spec §4.5 "new source bytes + metadata"), tracked separately from
    /// `fingerprint` so a metadata-only drift (the file was touched but its
    /// bytes are unchanged) can be told apart from a real content change.
    #[serde(default)]
    pub declared_size: Option<u64>,
    #[serde(default)]
    pub declared_mtime: Option<i64>,
    pub state: DocumentState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub last_error: Option<String>,
}

impl DocumentRecord {
    pub fn new_pending(
        doc_id: DocumentId,
        source: SourceHandle,
        fingerprint: Fingerprint,
        options_fp: Fingerprint,
        now: OffsetDateTime,
    ) -> Self {
        DocumentRecord {
            doc_id,
            source,
            fingerprint,
            options_fp,
            chunk_ids: Vec::new(),
            pairs: Vec::new(),
            vector_indexed: false,
            keyword_indexed: false,
            extraction_prompt: String::new(),
            declared_size: None,
            declared_mtime: None,
            state: DocumentState::Pending,
            created_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    /// Invariant I1: a `Ready` record must have both adapters populated.
    pub fn is_consistent_when_ready(&self) -> bool {
        self.state != DocumentState::Ready || (self.vector_indexed && self.keyword_indexed)
    }
}
