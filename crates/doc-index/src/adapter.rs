use std::collections::HashSet;

use doc_types::{ChunkId, DocumentId, Error};

pub use doc_types::ChunkWrite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Vector,
    Keyword,
}

/// Restricts results to a set of document ids (spec §4.8, "Filters").
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub doc_ids: Option<HashSet<DocumentId>>,
}

impl QueryFilter {
    pub fn allows(&self, doc_id: &DocumentId) -> bool {
        match &self.doc_ids {
            Some(set) => set.contains(doc_id),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub payload: String,
}

/// The query each adapter accepts through the shared `query` method. Both
/// adapters expose the identical `(q, top_k, filter) -> Hits` surface (spec
/// §4.4); this enum is the `q` — a text adapter rejects `Embedding` and a
/// vector adapter rejects `Text`, each with a `Validation`-kind `Error`.
#[derive(Debug, Clone)]
pub enum AdapterQuery {
    Text(String),
    Embedding(Vec<f32>),
}

/// Common surface of the Vector and Keyword backends (spec §4.4). Both
/// `add` and `delete` are idempotent with respect to `(doc_id, ordinal)`:
/// repeated application converges to the same state, which is what makes
/// Intent Log replay after a crash safe (spec §4.6, P5).
pub trait IndexAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    fn add(&self, doc_id: &DocumentId, writes: &[ChunkWrite]) -> Result<(), Error>;

    fn delete(&self, doc_id: &DocumentId) -> Result<(), Error>;

    fn query(&self, query: &AdapterQuery, top_k: usize, filter: &QueryFilter) -> Result<Vec<Hit>, Error>;

    fn count(&self, doc_id: Option<&DocumentId>) -> Result<usize, Error>;

    fn exists(&self, doc_id: &DocumentId) -> Result<bool, Error>;

    /// Every distinct `doc_id` this adapter currently holds chunks for.
    /// Used by `verify_consistency` (spec §4.3) and by repair (spec §4.6).
    fn doc_ids(&self) -> Result<HashSet<DocumentId>, Error>;
}
