//! LMDB-backed (`heed`) durable storage: the Fingerprint Store, Artifact
//! Cache, Document Registry, and Intent Log (spec §4.1–§4.3, §4.6), unified
//! behind a single `StorageContext`.

pub mod cache;
pub mod fingerprint_store;
pub mod intent_log;
pub mod registry;
pub mod storage;

pub use cache::{cache_key, ArtifactCache, CachedArtifact};
pub use fingerprint_store::{FingerprintEntry, FingerprintStore};
pub use intent_log::{IntentLog, IntentRecord, IntentState, OpId, PrimitiveStep};
pub use registry::{Consistency, ConsistencyReport, DocumentRegistry, ListFilter, Paging};
pub use storage::{StorageConfig, StorageContext};
