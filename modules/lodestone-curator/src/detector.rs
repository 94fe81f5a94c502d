//! Duplicate detection over a read-only snapshot of the catalog.
//!
//! Three passes run in fixed priority order — exact normalized-URL match,
//! near-duplicate title match, exact content-fingerprint match — sharing
//! one `claimed` set: a record placed into any group (as canonical or
//! duplicate) is invisible to later passes. URL identity is the strongest
//! and cheapest signal, so it runs first and the O(n²) title pass only
//! ever sees the residue.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use lodestone_common::{DetectionMethod, DuplicateGroup, Resource};

use crate::normalize::{compute_fingerprint, normalize_url};
use crate::quality::assess_quality;
use crate::similarity::title_similarity;

/// Two titles at or above this jaccard similarity are the same work.
pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Fixed confidence tag for fingerprint matches: equality of the token-bag
/// hash is strong evidence but not proof of true duplication.
pub const FINGERPRINT_SIMILARITY: f64 = 0.95;

/// Titles shorter than this are too generic to compare.
const MIN_TITLE_CHARS: usize = 10;

/// Run all three detection passes over a snapshot, in priority order.
pub fn find_duplicate_groups(resources: &[Resource], now: DateTime<Utc>) -> Vec<DuplicateGroup> {
    let mut claimed: HashSet<Uuid> = HashSet::new();
    let mut groups = url_pass(resources, &mut claimed, now);
    groups.extend(title_pass(resources, &mut claimed));
    groups.extend(fingerprint_pass(resources, &mut claimed, now));
    groups
}

/// Pass 1: group unclaimed records by normalized source URL. Records with
/// no URL cannot participate.
pub fn url_pass(
    resources: &[Resource],
    claimed: &mut HashSet<Uuid>,
    now: DateTime<Utc>,
) -> Vec<DuplicateGroup> {
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    let mut key_order: Vec<String> = Vec::new();

    for (idx, resource) in resources.iter().enumerate() {
        if claimed.contains(&resource.id) {
            continue;
        }
        let Some(source_url) = resource.source_url.as_deref().filter(|u| !u.is_empty()) else {
            continue;
        };
        let key = normalize_url(source_url);
        let bucket = buckets.entry(key.clone()).or_default();
        if bucket.is_empty() {
            key_order.push(key);
        }
        bucket.push(idx);
    }

    let mut groups = Vec::new();
    for key in key_order {
        let members = &buckets[&key];
        if members.len() < 2 {
            continue;
        }
        groups.push(claim_group(
            resources,
            members,
            claimed,
            now,
            DetectionMethod::UrlMatch,
            1.0,
        ));
    }
    groups
}

/// Pass 2: pairwise title similarity over the unclaimed residue. The first
/// record of each matching set (in snapshot order) becomes canonical;
/// group similarity is the maximum observed across its duplicates.
pub fn title_pass(resources: &[Resource], claimed: &mut HashSet<Uuid>) -> Vec<DuplicateGroup> {
    let candidates: Vec<usize> = resources
        .iter()
        .enumerate()
        .filter(|(_, r)| !claimed.contains(&r.id))
        .filter(|(_, r)| {
            r.title
                .as_deref()
                .is_some_and(|t| t.chars().count() >= MIN_TITLE_CHARS)
        })
        .map(|(idx, _)| idx)
        .collect();

    let mut groups = Vec::new();
    for (pos, &i) in candidates.iter().enumerate() {
        if claimed.contains(&resources[i].id) {
            continue;
        }
        let title_i = resources[i].title.as_deref().unwrap_or_default();

        let mut duplicate_ids = Vec::new();
        let mut max_similarity: f64 = 0.0;
        for &j in &candidates[pos + 1..] {
            if claimed.contains(&resources[j].id) {
                continue;
            }
            let title_j = resources[j].title.as_deref().unwrap_or_default();
            let similarity = title_similarity(title_i, title_j);
            if similarity >= TITLE_SIMILARITY_THRESHOLD {
                duplicate_ids.push(resources[j].id);
                claimed.insert(resources[j].id);
                max_similarity = max_similarity.max(similarity);
            }
        }

        if !duplicate_ids.is_empty() {
            claimed.insert(resources[i].id);
            groups.push(DuplicateGroup {
                canonical_id: resources[i].id,
                duplicate_ids,
                reason: DetectionMethod::TitleSimilarity,
                similarity: max_similarity,
            });
        }
    }
    groups
}

/// Pass 3: group the remaining unclaimed records by content fingerprint
/// (falling back to the abstract when content is absent). Records whose
/// text is too short to fingerprint are skipped.
pub fn fingerprint_pass(
    resources: &[Resource],
    claimed: &mut HashSet<Uuid>,
    now: DateTime<Utc>,
) -> Vec<DuplicateGroup> {
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    let mut key_order: Vec<String> = Vec::new();

    for (idx, resource) in resources.iter().enumerate() {
        if claimed.contains(&resource.id) {
            continue;
        }
        let text = resource
            .content
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(resource.abstract_text.as_deref())
            .unwrap_or_default();
        let fingerprint = compute_fingerprint(text);
        if fingerprint.is_empty() {
            continue;
        }
        let bucket = buckets.entry(fingerprint.clone()).or_default();
        if bucket.is_empty() {
            key_order.push(fingerprint);
        }
        bucket.push(idx);
    }

    let mut groups = Vec::new();
    for key in key_order {
        let members = &buckets[&key];
        if members.len() < 2 {
            continue;
        }
        groups.push(claim_group(
            resources,
            members,
            claimed,
            now,
            DetectionMethod::ContentFingerprint,
            FINGERPRINT_SIMILARITY,
        ));
    }
    groups
}

/// Quality-rank a bucket, claim every member, and emit the group with the
/// best-scoring record as canonical.
fn claim_group(
    resources: &[Resource],
    members: &[usize],
    claimed: &mut HashSet<Uuid>,
    now: DateTime<Utc>,
    reason: DetectionMethod,
    similarity: f64,
) -> DuplicateGroup {
    let ordered = rank_by_quality(resources, members, now);
    for &idx in &ordered {
        claimed.insert(resources[idx].id);
    }
    DuplicateGroup {
        canonical_id: resources[ordered[0]].id,
        duplicate_ids: ordered[1..].iter().map(|&idx| resources[idx].id).collect(),
        reason,
        similarity,
    }
}

/// Sort member indices by quality score descending. Ties resolve to the
/// earlier snapshot index — an explicit stable tie-break, independent of
/// the sort primitive's stability guarantees.
fn rank_by_quality(resources: &[Resource], members: &[usize], now: DateTime<Utc>) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = members
        .iter()
        .map(|&idx| (idx, assess_quality(&resources[idx], now)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.into_iter().map(|(idx, _)| idx).collect()
}
