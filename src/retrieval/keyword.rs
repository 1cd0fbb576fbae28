//! Lexical matching over chunk text

/// Positions of chunks whose text contains `query`, case-insensitively.
///
/// `folded_texts` are the chunk texts already lowercased, in corpus order.
/// Matches are returned in that order, at most `limit` of them. A blank query
/// matches nothing.
pub fn substring_matches(folded_texts: &[String], query: &str, limit: usize) -> Vec<usize> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }

    folded_texts
        .iter()
        .enumerate()
        .filter(|(_, text)| text.contains(&needle))
        .map(|(position, _)| position)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_lowercase()).collect()
    }

    #[test]
    fn test_case_insensitive_in_corpus_order() {
        let texts = fold(&[
            "Transformers use attention",
            "convolutions",
            "ATTENTION is all you need",
            "self-attention layers",
        ]);

        assert_eq!(substring_matches(&texts, "Attention", 10), vec![0, 2, 3]);
        assert_eq!(substring_matches(&texts, "attention", 2), vec![0, 2]);
    }

    #[test]
    fn test_query_is_trimmed() {
        let texts = fold(&["graph neural networks"]);
        assert_eq!(substring_matches(&texts, "  neural ", 5), vec![0]);
    }

    #[test]
    fn test_no_matches() {
        let texts = fold(&["alpha", "beta"]);
        assert!(substring_matches(&texts, "gamma", 5).is_empty());
        assert!(substring_matches(&texts, "   ", 5).is_empty());
        assert!(substring_matches(&texts, "alpha", 0).is_empty());
        assert!(substring_matches(&[], "alpha", 5).is_empty());
    }
}
