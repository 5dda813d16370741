use serde::{Deserialize, Serialize};

use crate::ids::{ChunkId, DocumentId};
use crate::source::SourceHandle;

/// A `(model_name, part_number)` pair extracted from a datasheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub model_name: String,
    pub part_number: String,
}

/// How a chunk's originating text was obtained, recorded for diagnostics and
/// for the Change Detector's `OptionsChanged` repair path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    DatasheetVision,
    GenericText,
    Markdown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: Option<DocumentId>,
    pub source: Option<SourceHandle>,
    pub ordinal: u32,
    /// Pairs demonstrably originating from this chunk's source region.
    pub pairs: Vec<Pair>,
    pub language: Option<String>,
    pub parse_method: Option<ParseMethod>,
}

/// The minimal unit of indexing: an immutable slice of UTF-8 text plus
/// metadata. `text` may include keyword-augmentation tokens appended by the
/// ingest pipeline (spec §9 design note): those tokens are part of the
/// payload, not a transient annotation, because they are a correctness
/// contract for BM25 recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(id: ChunkId, text: String, metadata: ChunkMetadata) -> Self {
        Chunk { id, text, metadata }
    }
}

/// A chunk paired with its embedding, when one is needed. Kept in
/// `doc-types` rather than `doc-index` (where the adapters that consume it
/// live) so the Intent Log in `doc-store` — a layer below `doc-index` — can
/// carry the same type in its durable replay steps without an upward
/// dependency. The Keyword adapter ignores `embedding`; the Vector adapter
/// requires it and rejects a write where it is absent or dimension-mismatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkWrite {
    pub chunk: Chunk,
    pub embedding: Option<Vec<f32>>,
}
