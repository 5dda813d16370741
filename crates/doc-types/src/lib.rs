//! Shared domain types, external-capability traits, and the error taxonomy
//! used across the document ingestion and search engine. Analogous to
//! `meilisearch-types`: every other crate in the workspace depends on this
//! one and none of its types depend back on them.

pub mod capability;
pub mod change;
pub mod chunk;
pub mod error;
pub mod fingerprint;
pub mod ids;
pub mod options;
pub mod record;
pub mod source;

pub use capability::{ContentExtractor, ExtractionOutput, KeywordGenerator, Vectorizer};
pub use change::ChangeKind;
pub use chunk::{Chunk, ChunkMetadata, ChunkWrite, Pair, ParseMethod};
pub use error::{Error, ErrorKind};
pub use fingerprint::Fingerprint;
pub use ids::{ChunkId, DocumentId};
pub use options::{ExtractionMode, ProcessingOptions};
pub use record::{DocumentRecord, DocumentState};
pub use source::SourceHandle;

pub type Result<T, E = Error> = std::result::Result<T, E>;
