use serde::{Deserialize, Serialize};

use crate::chunk::{Pair, ParseMethod};
use crate::error::Error;
use crate::options::ExtractionMode;

/// Result of extracting structured content from raw source bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub text: String,
    pub pairs: Vec<Pair>,
    pub parse_method: ParseMethod,
    pub page_count: u32,
}

/// Out-of-core capability: turns raw bytes into text plus optional entity
/// pairs. Implementations (PDF parsing, vision/LLM calls) live outside this
/// crate; the core only depends on this trait (spec §6).
pub trait ContentExtractor: Send + Sync {
    fn extract(
        &self,
        bytes: &[u8],
        mime_hint: Option<&str>,
        mode: ExtractionMode,
        prompt: &str,
    ) -> Result<ExtractionOutput, Error>;
}

/// Out-of-core capability: text -> dense embedding vectors.
pub trait Vectorizer: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error>;
}

/// Out-of-core capability: chunk text -> extra keywords to append before
/// indexing. Failure here is non-fatal; the chunk is indexed unaugmented.
pub trait KeywordGenerator: Send + Sync {
    fn augment(&self, chunk_text: &str, doc_context: &str) -> Result<Vec<String>, Error>;
}
