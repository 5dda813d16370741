/// A tokenizer deliberately simpler than a production one (no stemming, no
/// locale-aware segmentation): lowercases and splits on anything that is
/// not alphanumeric. Good enough for BM25 term statistics and for the
/// Hybrid Search model-number heuristic (spec §4.8), which works on raw
/// uppercase/digit shape rather than tokenized words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_on_punctuation_and_lowercases() {
        assert_eq!(tokenize("PM10K-2293937, rev.B"), vec!["pm10k", "2293937", "rev", "b"]);
    }
}
