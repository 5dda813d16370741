//! Vector and Keyword storage adapters, the Change Detector, the chunker,
//! and the Index Manager: the transactional façade that carries a
//! `ChangeKind` across both adapters and the Registry (spec §4.4–§4.6).
//! Analogous to `milli`'s indexing half, generalized from documents to
//! arbitrary chunked text with two parallel backends instead of one.

pub mod adapter;
pub mod change_detector;
pub mod chunker;
pub mod index_manager;
pub mod keyword_adapter;
pub mod tokenize;
pub mod vector_adapter;

pub use adapter::{AdapterKind, AdapterQuery, ChunkWrite, Hit, IndexAdapter, QueryFilter};
pub use change_detector::{detect_change, is_metadata_only_drift};
pub use chunker::{attach_pairs, augment_chunk_text, chunk_text};
pub use index_manager::{ChunkConfig, IndexManager, IngestOutcome, TimeoutConfig};
pub use keyword_adapter::KeywordAdapter;
pub use vector_adapter::VectorAdapter;
