//! Merge execution for detected duplicate groups.
//!
//! For each group: backfill superior fields from the duplicates into the
//! canonical record, repoint raw-data relations, delete the duplicates,
//! and append one audit record. A group is treated as a unit — any failure
//! mid-group abandons that group with a report error and the run moves on.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use lodestone_common::{DeduplicationRecord, DuplicateGroup, Resource, ResourcePatch};
use lodestone_store::RecordStore;

use crate::report::CleaningReport;

/// Audit tag for dedup records written by this job.
const PROCESSED_BY: &str = "lodestone-curator";

pub struct MergeResolver {
    store: Arc<dyn RecordStore>,
}

impl MergeResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Merge one group, folding the outcome into the report. Never
    /// propagates: failures become report errors so a single bad group
    /// cannot abort the run.
    pub async fn merge_group(
        &self,
        group: &DuplicateGroup,
        dry_run: bool,
        report: &mut CleaningReport,
    ) {
        if let Err(err) = self.apply(group, dry_run, report).await {
            warn!(canonical = %group.canonical_id, error = %err, "Merge group failed");
            report
                .errors
                .push(format!("Failed to merge group {}: {err}", group.canonical_id));
        }
    }

    async fn apply(
        &self,
        group: &DuplicateGroup,
        dry_run: bool,
        report: &mut CleaningReport,
    ) -> Result<()> {
        // Never touch the duplicates unless the canonical target is
        // confirmed to still exist (it may have raced with another delete).
        let Some(canonical) = self.store.find_resource(group.canonical_id).await? else {
            report
                .errors
                .push(format!("Canonical resource not found: {}", group.canonical_id));
            return Ok(());
        };

        let mut duplicates = Vec::new();
        for &id in &group.duplicate_ids {
            if let Some(duplicate) = self.store.find_resource(id).await? {
                duplicates.push(duplicate);
            }
        }

        let patch = build_patch(&canonical, &duplicates);

        if dry_run {
            if !patch.is_empty() {
                report.merged_resources += 1;
            }
            report.updated_relations += self
                .store
                .count_raw_data_for_resources(&group.duplicate_ids)
                .await?;
            report.deleted_resources += duplicates.len() as u64;
            return Ok(());
        }

        if !patch.is_empty() {
            self.store.update_resource(group.canonical_id, &patch).await?;
            report.merged_resources += 1;
        }

        let updated = self
            .store
            .repoint_raw_data(&group.duplicate_ids, group.canonical_id)
            .await?;
        report.updated_relations += updated;

        let deleted = self.store.delete_resources(&group.duplicate_ids).await?;
        report.deleted_resources += deleted;

        self.store
            .insert_dedup_record(&DeduplicationRecord {
                id: Uuid::new_v4(),
                resource_id: group.canonical_id,
                duplicate_of_id: group.duplicate_ids[0],
                method: group.reason,
                similarity: group.similarity,
                decision: "merged".to_string(),
                merged_ids: group.duplicate_ids.clone(),
                processed_by: PROCESSED_BY.to_string(),
                created_at: Utc::now(),
            })
            .await?;

        info!(
            canonical = %group.canonical_id,
            duplicates = group.duplicate_ids.len(),
            method = group.reason.as_str(),
            "Merged duplicate group"
        );
        Ok(())
    }
}

/// Field-level "most complete wins": a duplicate's value replaces the
/// working value only when non-empty and strictly longer (by chars), or
/// when the working value is absent. Comparisons run against the working
/// value, so a later duplicate can overwrite what an earlier one
/// contributed — if it is even longer.
fn build_patch(canonical: &Resource, duplicates: &[Resource]) -> ResourcePatch {
    let mut patch = ResourcePatch::default();
    let mut title = canonical.title.clone();
    let mut abstract_text = canonical.abstract_text.clone();
    let mut content = canonical.content.clone();
    let mut ai_summary = canonical.ai_summary.clone();

    for duplicate in duplicates {
        absorb(&mut title, &duplicate.title, &mut patch.title);
        absorb(&mut abstract_text, &duplicate.abstract_text, &mut patch.abstract_text);
        absorb(&mut content, &duplicate.content, &mut patch.content);
        absorb(&mut ai_summary, &duplicate.ai_summary, &mut patch.ai_summary);
    }

    patch
}

fn absorb(current: &mut Option<String>, candidate: &Option<String>, patched: &mut Option<String>) {
    let Some(candidate) = candidate else { return };
    if candidate.is_empty() {
        return;
    }
    let candidate_len = candidate.chars().count();
    let wins = current
        .as_deref()
        .map_or(true, |cur| candidate_len > cur.chars().count());
    if wins {
        *current = Some(candidate.clone());
        *patched = Some(candidate.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::resource;
    use lodestone_common::DetectionMethod;
    use lodestone_store::MemoryStore;

    fn group_of(canonical: Uuid, duplicates: Vec<Uuid>) -> DuplicateGroup {
        DuplicateGroup {
            canonical_id: canonical,
            duplicate_ids: duplicates,
            reason: DetectionMethod::UrlMatch,
            similarity: 1.0,
        }
    }

    #[test]
    fn longer_duplicate_field_wins() {
        let mut canonical = resource();
        canonical.abstract_text = Some("short".to_string());
        let mut duplicate = resource();
        duplicate.abstract_text = Some("a much longer abstract text".to_string());

        let patch = build_patch(&canonical, &[duplicate]);
        assert_eq!(
            patch.abstract_text.as_deref(),
            Some("a much longer abstract text")
        );
    }

    #[test]
    fn shorter_or_equal_duplicate_never_overwrites() {
        let mut canonical = resource();
        canonical.title = Some("a title of some length".to_string());
        let mut same = resource();
        same.title = Some("a title of some length".to_string());
        let mut shorter = resource();
        shorter.title = Some("a title".to_string());

        let patch = build_patch(&canonical, &[same, shorter]);
        assert!(patch.title.is_none());
    }

    #[test]
    fn absent_canonical_field_takes_any_nonempty_value() {
        let canonical = resource();
        let mut duplicate = resource();
        duplicate.content = Some("x".to_string());

        let patch = build_patch(&canonical, &[duplicate]);
        assert_eq!(patch.content.as_deref(), Some("x"));
    }

    #[test]
    fn empty_duplicate_value_is_ignored() {
        let canonical = resource();
        let mut duplicate = resource();
        duplicate.ai_summary = Some(String::new());

        let patch = build_patch(&canonical, &[duplicate]);
        assert!(patch.ai_summary.is_none());
    }

    #[test]
    fn later_longer_duplicate_overwrites_earlier_one() {
        let canonical = resource();
        let mut first = resource();
        first.abstract_text = Some("medium length text".to_string());
        let mut second = resource();
        second.abstract_text = Some("the longest abstract text of the whole group".to_string());

        let patch = build_patch(&canonical, &[first, second]);
        assert_eq!(
            patch.abstract_text.as_deref(),
            Some("the longest abstract text of the whole group")
        );
    }

    #[test]
    fn later_shorter_duplicate_does_not_regress_working_value() {
        let canonical = resource();
        let mut first = resource();
        first.abstract_text = Some("the longest abstract text of the whole group".to_string());
        let mut second = resource();
        second.abstract_text = Some("medium length text".to_string());

        let patch = build_patch(&canonical, &[first, second]);
        assert_eq!(
            patch.abstract_text.as_deref(),
            Some("the longest abstract text of the whole group")
        );
    }

    #[tokio::test]
    async fn execute_merges_repoints_and_deletes() {
        let store = Arc::new(MemoryStore::new());

        let mut canonical = resource();
        canonical.abstract_text = Some("short".to_string());
        let mut duplicate = resource();
        duplicate.abstract_text = Some("a much longer abstract text".to_string());
        let (canonical_id, duplicate_id) = (canonical.id, duplicate.id);

        store.insert_resource(canonical);
        store.insert_resource(duplicate);
        store.insert_raw_data(crate::testing::raw_data(
            "arxiv",
            Some("2401.1"),
            serde_json::json!({}),
        ));
        // point the raw record at the duplicate
        let raw_id = store.raw_data()[0].id;
        store.link_raw_data(raw_id, duplicate_id).await.unwrap();

        let resolver = MergeResolver::new(store.clone());
        let mut report = CleaningReport::start(2, false);
        resolver
            .merge_group(&group_of(canonical_id, vec![duplicate_id]), false, &mut report)
            .await;

        assert!(report.errors.is_empty());
        assert_eq!(report.merged_resources, 1);
        assert_eq!(report.deleted_resources, 1);
        assert_eq!(report.updated_relations, 1);

        // canonical took the longer abstract
        let merged = store.find_resource(canonical_id).await.unwrap().unwrap();
        assert_eq!(merged.abstract_text.as_deref(), Some("a much longer abstract text"));

        // duplicate gone, raw data repointed at the canonical
        assert!(store.find_resource(duplicate_id).await.unwrap().is_none());
        assert_eq!(store.raw_data()[0].resource_id, Some(canonical_id));

        // one audit record with the merged-away ids
        let records = store.dedup_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resource_id, canonical_id);
        assert_eq!(records[0].merged_ids, vec![duplicate_id]);
        assert_eq!(records[0].decision, "merged");
    }

    #[tokio::test]
    async fn dry_run_counts_without_mutating() {
        let store = Arc::new(MemoryStore::new());

        let mut canonical = resource();
        canonical.abstract_text = Some("short".to_string());
        let mut duplicate = resource();
        duplicate.abstract_text = Some("a much longer abstract text".to_string());
        let (canonical_id, duplicate_id) = (canonical.id, duplicate.id);
        store.insert_resource(canonical);
        store.insert_resource(duplicate);

        let resolver = MergeResolver::new(store.clone());
        let mut report = CleaningReport::start(2, true);
        resolver
            .merge_group(&group_of(canonical_id, vec![duplicate_id]), true, &mut report)
            .await;

        assert_eq!(report.merged_resources, 1);
        assert_eq!(report.deleted_resources, 1);
        assert!(report.errors.is_empty());

        // nothing actually changed
        assert!(store.find_resource(duplicate_id).await.unwrap().is_some());
        let untouched = store.find_resource(canonical_id).await.unwrap().unwrap();
        assert_eq!(untouched.abstract_text.as_deref(), Some("short"));
        assert!(store.dedup_records().is_empty());
    }

    #[tokio::test]
    async fn missing_canonical_skips_group_and_keeps_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let mut duplicate = resource();
        duplicate.title = Some("survivor".to_string());
        let duplicate_id = duplicate.id;
        store.insert_resource(duplicate);

        let resolver = MergeResolver::new(store.clone());
        let mut report = CleaningReport::start(1, false);
        resolver
            .merge_group(&group_of(Uuid::new_v4(), vec![duplicate_id]), false, &mut report)
            .await;

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Canonical resource not found"));
        // fail-safe: duplicates untouched
        assert!(store.find_resource(duplicate_id).await.unwrap().is_some());
        assert_eq!(report.deleted_resources, 0);
    }
}
