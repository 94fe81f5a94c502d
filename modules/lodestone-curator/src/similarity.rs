//! Approximate string similarity for near-duplicate title detection.

use std::collections::HashSet;

use crate::normalize::clean_title;

/// Jaccard similarity between the whitespace-token sets of two strings.
///
/// Case-insensitive; duplicate tokens within a string collapse (set, not
/// multiset). Returns 0.0 when either input is empty, and is defined as
/// 0.0 rather than NaN if both token sets come out empty.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    intersection as f64 / union as f64
}

/// Title-to-title similarity: jaccard over punctuation-stripped titles, so
/// case and punctuation variants of the same title score 1.0.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    jaccard_similarity(&clean_title(a), &clean_title(b))
}
