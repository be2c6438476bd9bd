//! Pairwise duplicate detection for news items.
//!
//! Two items are duplicates when their article URLs match exactly
//! (after trimming surrounding whitespace), or when their titles exceed
//! the word-set Jaccard similarity threshold. Applied by the store on
//! every persist and once more by the synthesizer across the day's rows.

use std::collections::HashSet;

/// Threshold above which two titles count as the same story. Strict
/// greater-than: similarity of exactly 0.70 is distinct.
pub const DEFAULT_TITLE_SIMILARITY_THRESHOLD: f64 = 0.70;

/// Word-set Jaccard similarity over lowercased, whitespace-tokenized
/// titles. Two empty token sets yield 0.0. Symmetric.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<String> = a.to_lowercase().split_whitespace().map(str::to_string).collect();
    let tokens_b: HashSet<String> = b.to_lowercase().split_whitespace().map(str::to_string).collect();

    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    intersection as f64 / union as f64
}

/// The duplicate rule. URL equality is the primary key; title similarity
/// is the fallback when either side lacks an article URL.
pub fn is_duplicate(
    a_title: &str,
    a_url: Option<&str>,
    b_title: &str,
    b_url: Option<&str>,
    threshold: f64,
) -> bool {
    if let (Some(a), Some(b)) = (a_url, b_url) {
        let (a, b) = (a.trim(), b.trim());
        if !a.is_empty() && !b.is_empty() {
            if a == b {
                return true;
            }
            // Both sides carry distinct stable URLs: still fall through to
            // title similarity, since the same story is often syndicated
            // under different links.
        }
    }
    title_similarity(a_title, b_title) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_symmetric() {
        let a = "New GPT-5 model released today";
        let b = "GPT-5 model released today by OpenAI";
        assert_eq!(title_similarity(a, b), title_similarity(b, a));
    }

    #[test]
    fn similarity_of_identical_titles_is_one() {
        assert_eq!(title_similarity("Alpha beta gamma", "alpha BETA gamma"), 1.0);
    }

    #[test]
    fn similarity_of_empty_titles_is_zero() {
        assert_eq!(title_similarity("", ""), 0.0);
        assert_eq!(title_similarity("   ", ""), 0.0);
    }

    #[test]
    fn overlapping_titles_above_threshold_are_duplicates() {
        // Shared {new, gpt-5, model, released, today}, union of 7 tokens:
        // 5/7 ≈ 0.714, just over the line.
        let a = "New GPT-5 model released today";
        let b = "New GPT-5 model released today by OpenAI";
        let sim = title_similarity(a, b);
        assert!((sim - 5.0 / 7.0).abs() < 1e-9);
        assert!(is_duplicate(a, None, b, None, DEFAULT_TITLE_SIMILARITY_THRESHOLD));

        // Dropping "New" from one side leaves 4/7 — distinct.
        let c = "GPT-5 model released today by OpenAI";
        let sim = title_similarity(a, c);
        assert!((sim - 4.0 / 7.0).abs() < 1e-9);
        assert!(!is_duplicate(a, None, c, None, DEFAULT_TITLE_SIMILARITY_THRESHOLD));
    }

    #[test]
    fn threshold_is_strict() {
        // 7 shared tokens, 10 in the union: exactly 0.70 must be distinct.
        let a = "a b c d e f g h i j";
        let b = "a b c d e f g";
        let sim = title_similarity(a, b);
        assert!((sim - 0.70).abs() < 1e-9);
        assert!(!is_duplicate(a, None, b, None, DEFAULT_TITLE_SIMILARITY_THRESHOLD));
    }

    #[test]
    fn url_match_trims_whitespace() {
        assert!(is_duplicate(
            "Alpha",
            Some("  https://x.com/a "),
            "Alpha launch",
            Some("https://x.com/a"),
            DEFAULT_TITLE_SIMILARITY_THRESHOLD,
        ));
    }

    #[test]
    fn empty_urls_fall_back_to_titles() {
        assert!(!is_duplicate(
            "Completely different",
            Some(""),
            "Unrelated headline",
            Some(""),
            DEFAULT_TITLE_SIMILARITY_THRESHOLD,
        ));
    }

    #[test]
    fn distinct_urls_with_near_identical_titles_are_duplicates() {
        assert!(is_duplicate(
            "OpenAI ships GPT-5 to all users",
            Some("https://a.com/1"),
            "OpenAI ships GPT-5 to all paying users",
            Some("https://b.com/2"),
            DEFAULT_TITLE_SIMILARITY_THRESHOLD,
        ));
    }
}
