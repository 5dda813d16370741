//! Stand-in implementations of the out-of-core capabilities (spec §1 Non-
//! goals: "The PDF-to-text extractor and the vision/LLM API clients", "The
//! embedding provider and keyword-augmentation LLM"). These exist so
//! `doc-cli` is runnable end to end without a real extraction/embedding
//! backend wired in; a production deployment swaps them for something that
//! actually calls a PDF parser, a vision model, and an embedding API, the
//! same way the core only ever depends on the `ContentExtractor`/
//! `Vectorizer`/`KeywordGenerator` traits and never on a concrete client.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use doc_types::{
    Error, ExtractionMode, ExtractionOutput, ContentExtractor, KeywordGenerator, ParseMethod, Vectorizer,
};

/// Treats input bytes as UTF-8 (lossily) and returns them unchanged as the
/// extracted text. No PDF parsing, no vision calls, no pair extraction:
/// `pairs` is always empty. `mode` only affects which `ParseMethod` gets
/// recorded, since there is nothing here to actually branch the extraction
/// strategy on.
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn extract(
        &self,
        bytes: &[u8],
        _mime_hint: Option<&str>,
        mode: ExtractionMode,
        _prompt: &str,
    ) -> Result<ExtractionOutput, Error> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let parse_method = match mode {
            ExtractionMode::Datasheet => ParseMethod::DatasheetVision,
            ExtractionMode::Markdown => ParseMethod::Markdown,
            ExtractionMode::Generic | ExtractionMode::Auto => ParseMethod::GenericText,
        };
        let page_count = (text.len() as u32 / 3000).max(1);
        Ok(ExtractionOutput { text, pairs: Vec::new(), parse_method, page_count })
    }
}

/// Deterministic, hash-based bag-of-words embedding: every token is hashed
/// into one of `dimensions` buckets and accumulated, then the vector is
/// L2-normalized. Not semantically meaningful, but stable across runs and
/// process restarts, which is all `VectorAdapter`'s cosine scoring needs
/// from a stand-in.
pub struct HashingVectorizer {
    dimensions: usize,
}

impl HashingVectorizer {
    pub fn new(dimensions: usize) -> Self {
        HashingVectorizer { dimensions: dimensions.max(1) }
    }
}

impl Vectorizer for HashingVectorizer {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

impl HashingVectorizer {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut bucket = vec![0f32; self.dimensions];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dimensions;
            bucket[idx] += 1.0;
        }
        let norm = bucket.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut bucket {
                *v /= norm;
            }
        }
        bucket
    }
}

/// No-op keyword augmentation: produces no extra tokens. A real
/// implementation would call an LLM to surface synonyms/abbreviations for
/// part numbers the way the source system's keyword-augmentation step does;
/// since failure here is non-fatal by contract (spec §9 design note), an
/// always-empty stand-in is indistinguishable at the call site from "the
/// generator ran and had nothing to add".
pub struct NoopKeywordGenerator;

impl KeywordGenerator for NoopKeywordGenerator {
    fn augment(&self, _chunk_text: &str, _doc_context: &str) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_vectorizer_is_deterministic() {
        let v = HashingVectorizer::new(32);
        let a = v.embed(&["buck converter efficiency".to_string()]).unwrap();
        let b = v.embed(&["buck converter efficiency".to_string()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hashing_vectorizer_normalizes_nonempty_text() {
        let v = HashingVectorizer::new(8);
        let out = v.embed(&["a b c".to_string()]).unwrap();
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn plain_text_extractor_passes_bytes_through() {
        let out = PlainTextExtractor
            .extract(b"hello world", None, ExtractionMode::Generic, "")
            .expect("extract");
        assert_eq!(out.text, "hello world");
        assert!(out.pairs.is_empty());
    }
}
