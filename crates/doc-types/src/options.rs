use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Extraction strategy hint passed to the `ContentExtractor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Datasheet,
    Generic,
    Markdown,
    Auto,
}

/// The set of options that influence what chunks/pairs get produced for a
/// given source. Two ingests of identical content under identical options
/// are required to be no-ops (spec P1); changing any field here changes the
/// `DocumentId` (spec §3, DocumentId).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub mode: ExtractionMode,
    pub prompt: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        ProcessingOptions {
            mode: ExtractionMode::Auto,
            prompt: String::new(),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ProcessingOptions {
    /// Deterministic fingerprint of this option set, used as a component of
    /// `DocumentId` and as the cache key's prompt component.
    pub fn fingerprint(&self) -> Fingerprint {
        let bytes = serde_json::to_vec(self).expect("ProcessingOptions is always serializable");
        Fingerprint::of(&bytes, None, None)
    }
}
