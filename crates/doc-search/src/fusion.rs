use std::cmp::Ordering;
use std::collections::HashMap;

use doc_types::ChunkId;

use doc_index::Hit;

/// Which ranking formula combines the vector and keyword hit lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionMethod {
    /// Reciprocal rank fusion, rank-based and scale-free. The default.
    Rrf { k_rrf: f64 },
    /// Min-max normalized, linearly blended by `alpha` (the vector weight).
    Weighted { alpha: f32 },
    /// Classifies the query text and runs `Weighted` with the resulting
    /// `alpha` (see `classify_alpha`).
    Adaptive,
}

impl Default for FusionMethod {
    fn default() -> Self {
        FusionMethod::Rrf { k_rrf: 60.0 }
    }
}

/// Multiplicative bump applied to a chunk that both adapters agree on, in
/// the `Weighted` method.
pub const CONSENSUS_BOOST: f32 = 1.1;

/// A hit after fusion: the ChunkId survives (the chunk text/payload is
/// resolved by the caller, since neither adapter's `Hit::payload` is
/// guaranteed to be the canonical chunk text), the fused score, and the
/// 1-based rank the chunk held in the vector result set, if any — carried
/// through purely to support the tie-break rule in `rank_and_truncate`.
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub chunk_id: ChunkId,
    pub score: f32,
    vector_rank: Option<usize>,
}

struct Contribution {
    score: f32,
    vector_rank: Option<usize>,
}

/// Reciprocal rank fusion (spec §4.8): `1/(k_rrf + r)` contributed per hit
/// at 1-based rank `r`, summed across both result sets by `ChunkId`. No
/// score normalization — this is RRF's whole point, since vector cosine
/// scores and BM25 scores live on unrelated scales.
pub fn fuse_rrf(vector_hits: &[Hit], keyword_hits: &[Hit], k_rrf: f64) -> Vec<FusedHit> {
    let mut contributions: HashMap<ChunkId, Contribution> = HashMap::new();
    for (idx, hit) in vector_hits.iter().enumerate() {
        let rank = idx + 1;
        let entry = contributions
            .entry(hit.chunk_id.clone())
            .or_insert(Contribution { score: 0.0, vector_rank: Some(rank) });
        entry.score += (1.0 / (k_rrf + rank as f64)) as f32;
    }
    for (idx, hit) in keyword_hits.iter().enumerate() {
        let rank = idx + 1;
        let entry =
            contributions.entry(hit.chunk_id.clone()).or_insert(Contribution { score: 0.0, vector_rank: None });
        entry.score += (1.0 / (k_rrf + rank as f64)) as f32;
    }
    into_fused_hits(contributions)
}

/// Min-max normalization to `[0, 1]`. A result set with a single distinct
/// score (including the degenerate empty case) normalizes every hit to
/// `1.0` rather than dividing by zero.
fn min_max_normalize(hits: &[Hit]) -> HashMap<ChunkId, f32> {
    let mut out = HashMap::with_capacity(hits.len());
    if hits.is_empty() {
        return out;
    }
    let min = hits.iter().map(|h| h.score).fold(f32::INFINITY, f32::min);
    let max = hits.iter().map(|h| h.score).fold(f32::NEG_INFINITY, f32::max);
    let span = max - min;
    for hit in hits {
        let normalized = if span <= f32::EPSILON { 1.0 } else { (hit.score - min) / span };
        out.entry(hit.chunk_id.clone()).or_insert(normalized);
    }
    out
}

/// Weighted fusion (spec §4.8): min-max normalize each side, blend
/// `alpha * vector + (1 - alpha) * keyword`, then multiply by
/// `consensus_boost` for any chunk both adapters returned. `consensus_boost`
/// is the `hybrid.consensus_boost` config knob (spec §6); `CONSENSUS_BOOST`
/// is its default.
pub fn fuse_weighted(vector_hits: &[Hit], keyword_hits: &[Hit], alpha: f32, consensus_boost: f32) -> Vec<FusedHit> {
    let vector_norm = min_max_normalize(vector_hits);
    let keyword_norm = min_max_normalize(keyword_hits);
    let mut vector_rank: HashMap<ChunkId, usize> = HashMap::new();
    for (idx, hit) in vector_hits.iter().enumerate() {
        vector_rank.entry(hit.chunk_id.clone()).or_insert(idx + 1);
    }

    let mut contributions: HashMap<ChunkId, Contribution> = HashMap::new();
    for chunk_id in vector_norm.keys().chain(keyword_norm.keys()) {
        contributions.entry(chunk_id.clone()).or_insert_with(|| Contribution {
            score: 0.0,
            vector_rank: vector_rank.get(chunk_id).copied(),
        });
    }
    for (chunk_id, contribution) in contributions.iter_mut() {
        let v_hat = vector_norm.get(chunk_id).copied().unwrap_or(0.0);
        let k_hat = keyword_norm.get(chunk_id).copied().unwrap_or(0.0);
        let mut score = alpha * v_hat + (1.0 - alpha) * k_hat;
        if vector_norm.contains_key(chunk_id) && keyword_norm.contains_key(chunk_id) {
            score *= consensus_boost;
        }
        contribution.score = score;
    }
    into_fused_hits(contributions)
}

fn into_fused_hits(contributions: HashMap<ChunkId, Contribution>) -> Vec<FusedHit> {
    contributions
        .into_iter()
        .map(|(chunk_id, c)| FusedHit { chunk_id, score: c.score, vector_rank: c.vector_rank })
        .collect()
}

/// Applies the tie-break rule from spec §4.8 ("higher vector rank first,
/// then lower ChunkId lexicographically") and truncates to `top_k`. Sort is
/// by descending score first; `compare_ties` only runs when two scores are
/// exactly equal, which RRF in particular produces often (integer rank
/// sums collide more than float cosine scores do).
pub fn rank_and_truncate(mut hits: Vec<FusedHit>, top_k: usize) -> Vec<FusedHit> {
    hits.sort_by(|a, b| match b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal) {
        Ordering::Equal => compare_ties(a, b),
        order => order,
    });
    hits.truncate(top_k);
    hits
}

fn compare_ties(a: &FusedHit, b: &FusedHit) -> Ordering {
    match (a.vector_rank, b.vector_rank) {
        (Some(ra), Some(rb)) => ra.cmp(&rb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Model-number-like shape: runs of uppercase letters directly adjacent to
/// digits, e.g. `PM10K` or `RX2293937` (spec §4.8, "all-caps + digits
/// pattern"). Matched against the raw query text, not the tokenized form,
/// since case is exactly the signal this heuristic depends on.
fn looks_like_model_number(query: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| regex::Regex::new(r"[A-Z]{2,}[0-9]+|[0-9]{3,}[A-Z]+").unwrap());
    re.is_match(query)
}

/// Crude dictionary-word heuristic: a token is "dictionary-like" if it is
/// all lowercase alphabetic once the query is lowercased and has no digits,
/// the inverse of the model-number shape above.
fn mostly_dictionary_words(query: &str) -> bool {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return false;
    }
    let dictionary_like = tokens.iter().filter(|t| t.chars().all(|c| c.is_alphabetic())).count();
    dictionary_like as f32 / tokens.len() as f32 >= 0.8
}

/// Classifies `query` into a vector-weight `alpha` for the `Adaptive`
/// method (spec §4.8): part-number-shaped queries shift toward keyword
/// search, plain-language queries shift toward vector search, anything
/// else stays balanced.
pub fn classify_alpha(query: &str) -> f32 {
    if looks_like_model_number(query) {
        0.3
    } else if mostly_dictionary_words(query) {
        0.8
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use doc_types::DocumentId;

    use super::*;

    fn hit(doc: &str, ordinal: u32, score: f32) -> Hit {
        Hit { chunk_id: ChunkId::new(DocumentId(doc.to_string()), ordinal), score, payload: String::new() }
    }

    #[test]
    fn rrf_favors_hits_appearing_in_both_lists() {
        let vector_hits = vec![hit("a", 0, 0.9), hit("b", 0, 0.8)];
        let keyword_hits = vec![hit("b", 0, 12.0), hit("c", 0, 11.0)];
        let fused = rank_and_truncate(fuse_rrf(&vector_hits, &keyword_hits, 60.0), 10);
        assert_eq!(fused[0].chunk_id, ChunkId::new(DocumentId("b".into()), 0));
    }

    #[test]
    fn weighted_applies_consensus_boost() {
        let vector_hits = vec![hit("a", 0, 1.0), hit("b", 0, 0.5)];
        let keyword_hits = vec![hit("b", 0, 1.0)];
        let fused = fuse_weighted(&vector_hits, &keyword_hits, 0.5, CONSENSUS_BOOST);
        let a_score = fused.iter().find(|h| h.chunk_id.doc_id.0 == "a").unwrap().score;
        let b_score = fused.iter().find(|h| h.chunk_id.doc_id.0 == "b").unwrap().score;
        // b appears in both lists so its consensus-boosted blend outranks a's vector-only score.
        assert!(b_score > a_score);
    }

    #[test]
    fn weighted_handles_single_value_result_set_without_dividing_by_zero() {
        let vector_hits = vec![hit("a", 0, 1.0), hit("b", 0, 1.0)];
        let fused = fuse_weighted(&vector_hits, &[], 0.5, CONSENSUS_BOOST);
        assert!(fused.iter().all(|h| h.score.is_finite()));
    }

    #[test]
    fn classify_alpha_shifts_toward_keyword_for_model_numbers() {
        assert_eq!(classify_alpha("PM10K 2293937"), 0.3);
    }

    #[test]
    fn classify_alpha_shifts_toward_vector_for_dictionary_words() {
        assert_eq!(classify_alpha("how does a buck converter regulate voltage"), 0.8);
    }

    #[test]
    fn classify_alpha_stays_balanced_otherwise() {
        assert_eq!(classify_alpha("x7 v2"), 0.5);
    }

    #[test]
    fn tie_break_prefers_higher_vector_rank_then_chunk_id() {
        // "vector_only" is rank 1 in the vector list and absent from keyword;
        // "keyword_only" is rank 1 in the keyword list and absent from vector.
        // Both contribute the identical 1/(k_rrf + 1), so the tie-break must
        // decide, and it must prefer the one with a vector rank.
        let vector_hits = vec![hit("vector_only", 0, 0.9)];
        let keyword_hits = vec![hit("keyword_only", 0, 12.0)];
        let fused = rank_and_truncate(fuse_rrf(&vector_hits, &keyword_hits, 60.0), 10);
        assert_eq!(fused[0].score, fused[1].score);
        assert_eq!(fused[0].chunk_id.doc_id.0, "vector_only");
    }
}
