use std::sync::Arc;

use tracing::instrument;

use doc_index::{AdapterQuery, IndexAdapter, QueryFilter};
use doc_types::{Error, Vectorizer};

use crate::fusion::{classify_alpha, fuse_rrf, fuse_weighted, rank_and_truncate, FusedHit, FusionMethod, CONSENSUS_BOOST};

/// Oversampling factor `M`: each adapter is asked for `top_k * M` hits so
/// fusion has enough of a candidate pool to re-rank from, not just the
/// eventual top-k of either individual ranking.
const DEFAULT_OVERSAMPLE_FACTOR: usize = 4;
/// Oversampling constant `C`, added so small `top_k` values still get a
/// reasonable-sized candidate pool (`top_k=1` would otherwise request only
/// `M` candidates).
const DEFAULT_OVERSAMPLE_CONSTANT: usize = 20;

fn candidate_count(top_k: usize, oversample_factor: usize, oversample_constant: usize) -> usize {
    (top_k * oversample_factor).max(top_k + oversample_constant)
}

/// Fuses the Vector and Keyword adapters into one ranked result list (spec
/// §4.8). Holds no state of its own beyond the two adapters and the
/// embedding capability; every call is independent.
pub struct HybridSearch {
    vector: Arc<dyn IndexAdapter>,
    keyword: Arc<dyn IndexAdapter>,
    vectorizer: Arc<dyn Vectorizer>,
    oversample_factor: usize,
    oversample_constant: usize,
    consensus_boost: f32,
}

impl HybridSearch {
    pub fn new(vector: Arc<dyn IndexAdapter>, keyword: Arc<dyn IndexAdapter>, vectorizer: Arc<dyn Vectorizer>) -> Self {
        HybridSearch {
            vector,
            keyword,
            vectorizer,
            oversample_factor: DEFAULT_OVERSAMPLE_FACTOR,
            oversample_constant: DEFAULT_OVERSAMPLE_CONSTANT,
            consensus_boost: CONSENSUS_BOOST,
        }
    }

    pub fn with_oversample(mut self, factor: usize, constant: usize) -> Self {
        self.oversample_factor = factor;
        self.oversample_constant = constant;
        self
    }

    /// Overrides the `hybrid.consensus_boost` config knob (spec §6); defaults
    /// to `CONSENSUS_BOOST`.
    pub fn with_consensus_boost(mut self, consensus_boost: f32) -> Self {
        self.consensus_boost = consensus_boost;
        self
    }

    /// Runs both adapter queries concurrently (`rayon::join`, the idiom
    /// this workspace uses wherever two independent blocking calls can
    /// overlap) and fuses the results per `method`.
    #[instrument(skip(self, query, filter))]
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        method: FusionMethod,
        filter: &QueryFilter,
    ) -> Result<Vec<FusedHit>, Error> {
        let k = candidate_count(top_k, self.oversample_factor, self.oversample_constant);
        let embedding = self
            .vectorizer
            .embed(std::slice::from_ref(&query.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::VectorizerError("no embedding returned for query".into()))?;

        let (vector_result, keyword_result) = rayon::join(
            || self.vector.query(&AdapterQuery::Embedding(embedding), k, filter),
            || self.keyword.query(&AdapterQuery::Text(query.to_string()), k, filter),
        );
        let vector_hits = vector_result?;
        let keyword_hits = keyword_result?;

        let fused = match method {
            FusionMethod::Rrf { k_rrf } => fuse_rrf(&vector_hits, &keyword_hits, k_rrf),
            FusionMethod::Weighted { alpha } => fuse_weighted(&vector_hits, &keyword_hits, alpha, self.consensus_boost),
            FusionMethod::Adaptive => {
                let alpha = classify_alpha(query);
                fuse_weighted(&vector_hits, &keyword_hits, alpha, self.consensus_boost)
            }
        };
        Ok(rank_and_truncate(fused, top_k))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use doc_types::{Chunk, ChunkId, ChunkMetadata, ChunkWrite, DocumentId};
    use tempfile::TempDir;

    use super::*;

    struct FakeVectorizer;
    impl Vectorizer for FakeVectorizer {
        fn dimensions(&self) -> usize {
            1
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn write(doc_id: &DocumentId, ordinal: u32, text: &str) -> ChunkWrite {
        let id = ChunkId::new(doc_id.clone(), ordinal);
        ChunkWrite {
            chunk: Chunk::new(id, text.to_string(), ChunkMetadata::default()),
            embedding: Some(vec![1.0]),
        }
    }

    #[test]
    fn rrf_is_the_default_and_orders_consensus_hits_first() {
        let dir = TempDir::new().expect("tempdir");
        let vector = Arc::new(doc_index::VectorAdapter::open(dir.path().join("vector"), 1, 1 << 20).expect("vector"));
        let keyword =
            Arc::new(doc_index::KeywordAdapter::open(dir.path().join("keyword"), 1.2, 0.75, 1 << 20).expect("keyword"));

        let doc_a = DocumentId("doc-a".into());
        let doc_b = DocumentId("doc-b".into());
        vector.add(&doc_a, &[write(&doc_a, 0, "buck converter efficiency")]).expect("vector add a");
        vector.add(&doc_b, &[write(&doc_b, 0, "unrelated chunk")]).expect("vector add b");
        keyword.add(&doc_a, &[write(&doc_a, 0, "buck converter efficiency")]).expect("keyword add a");

        let search = HybridSearch::new(vector, keyword, Arc::new(FakeVectorizer));
        let hits = search
            .search("buck converter", 5, FusionMethod::default(), &QueryFilter::default())
            .expect("search");
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, ChunkId::new(doc_a, 0));
    }

    #[test]
    fn filter_restricts_results_to_named_doc_ids() {
        let dir = TempDir::new().expect("tempdir");
        let vector = Arc::new(doc_index::VectorAdapter::open(dir.path().join("vector"), 1, 1 << 20).expect("vector"));
        let keyword =
            Arc::new(doc_index::KeywordAdapter::open(dir.path().join("keyword"), 1.2, 0.75, 1 << 20).expect("keyword"));

        let doc_a = DocumentId("doc-a".into());
        let doc_b = DocumentId("doc-b".into());
        vector.add(&doc_a, &[write(&doc_a, 0, "widget")]).expect("vector add a");
        vector.add(&doc_b, &[write(&doc_b, 0, "widget")]).expect("vector add b");
        keyword.add(&doc_a, &[write(&doc_a, 0, "widget")]).expect("keyword add a");
        keyword.add(&doc_b, &[write(&doc_b, 0, "widget")]).expect("keyword add b");

        let search = HybridSearch::new(vector, keyword, Arc::new(FakeVectorizer));
        let mut allowed = HashSet::new();
        allowed.insert(doc_a.clone());
        let filter = QueryFilter { doc_ids: Some(allowed) };
        let hits = search.search("widget", 5, FusionMethod::default(), &filter).expect("search");
        assert!(hits.iter().all(|h| h.chunk_id.doc_id == doc_a));
    }
}
