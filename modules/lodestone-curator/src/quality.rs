//! Resource quality scoring, used to pick the canonical record inside a
//! duplicate group.

use chrono::{DateTime, Utc};

use lodestone_common::Resource;

/// Compute an additive quality score for a resource.
///
/// Combines source trust, content completeness, recency, and citations.
/// Pure and deterministic given the same record and `now` — callers pass
/// the clock in so an entire detection run scores against one instant.
pub fn assess_quality(resource: &Resource, now: DateTime<Utc>) -> f64 {
    let mut score = source_trust(resource.source.as_deref());

    // Completeness
    if resource
        .abstract_text
        .as_deref()
        .is_some_and(|a| a.chars().count() > 100)
    {
        score += 20.0;
    }
    if resource
        .content
        .as_deref()
        .is_some_and(|c| c.chars().count() > 500)
    {
        score += 30.0;
    }
    if resource.authors.as_ref().is_some_and(|a| !a.is_empty()) {
        score += 10.0;
    }

    // Recency
    if let Some(published_at) = resource.published_at {
        let days = (now - published_at).num_days();
        if days <= 30 {
            score += 20.0;
        } else if days <= 90 {
            score += 15.0;
        } else if days <= 365 {
            score += 10.0;
        }
    }

    // Citations: diminishing, capped at +20
    if let Some(citations) = resource.citation_count {
        score += (citations as f64 / 5.0).min(20.0);
    }

    score
}

/// Fixed trust table keyed by (case-insensitive) source name. Unknown and
/// missing sources both land on the 50-point baseline.
fn source_trust(source: Option<&str>) -> f64 {
    let Some(source) = source else { return 50.0 };
    match source.to_lowercase().as_str() {
        "arxiv" => 95.0,
        "ieee" | "acm" | "semantic_scholar" => 90.0,
        "github" => 85.0,
        "hackernews" => 70.0,
        _ => 50.0,
    }
}
