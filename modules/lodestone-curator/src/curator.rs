//! Run orchestration: the entry points a scheduler or CLI invokes.
//!
//! One `Curator` per store. Runs are sequential batch jobs — detection
//! works over a snapshot, and each merge must be visible to nothing else
//! before the next group is considered, so there is no internal
//! parallelism. Concurrent runs require external locking; dry-run modes
//! perform no writes and are safe alongside anything.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use lodestone_store::RecordStore;

use crate::detector::find_duplicate_groups;
use crate::merge::MergeResolver;
use crate::repair::RelationRepair;
use crate::report::{CleaningReport, FixStats, VerificationSummary};

pub struct Curator {
    store: Arc<dyn RecordStore>,
}

impl Curator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Detect and merge duplicate resources. Per-group failures land in
    /// the report's error list; the run itself only fails if the initial
    /// snapshot cannot be fetched.
    pub async fn run_deduplication(&self, dry_run: bool) -> Result<CleaningReport> {
        let resources = self.store.list_resources().await?;
        let now = Utc::now();

        let mut report = CleaningReport::start(resources.len() as u64, dry_run);
        let groups = find_duplicate_groups(&resources, now);
        report.duplicate_groups = groups.len() as u64;
        info!(
            total = resources.len(),
            groups = groups.len(),
            dry_run,
            "Duplicate detection complete"
        );

        let resolver = MergeResolver::new(self.store.clone());
        for group in &groups {
            resolver.merge_group(group, dry_run, &mut report).await;
        }

        report.finish();
        info!(
            merged = report.merged_resources,
            deleted = report.deleted_resources,
            relations = report.updated_relations,
            errors = report.errors.len(),
            "Deduplication run complete"
        );
        Ok(report)
    }

    /// Re-link orphaned raw records (see [`RelationRepair`]).
    pub async fn run_relation_repair(&self, dry_run: bool) -> Result<FixStats> {
        let stats = RelationRepair::new(self.store.clone()).run(dry_run).await?;
        info!(
            total = stats.total,
            linked = stats.linked,
            created = stats.created,
            skipped = stats.skipped,
            errors = stats.errors,
            "Relation repair complete"
        );
        Ok(stats)
    }

    /// Read-only bidirectional link verification.
    pub async fn verify_bidirectional_links(&self) -> Result<VerificationSummary> {
        let summary = RelationRepair::new(self.store.clone()).verify().await?;
        info!(
            inconsistencies = summary.inconsistencies.len(),
            raw_coverage_pct = summary.raw_link_coverage(),
            resource_coverage_pct = summary.resource_link_coverage(),
            "Link verification complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::resource;
    use lodestone_store::MemoryStore;

    #[tokio::test]
    async fn second_run_finds_nothing_to_do() {
        let store = Arc::new(MemoryStore::new());
        let make = |cite: i64| {
            let mut r = resource();
            r.source_url = Some("https://arxiv.org/abs/2401.12345".to_string());
            r.title = Some("A Survey of Everything Important".to_string());
            r.citation_count = Some(cite);
            r
        };
        store.insert_resource(make(100));
        store.insert_resource(make(5));
        store.insert_resource(make(0));

        let curator = Curator::new(store.clone() as Arc<dyn RecordStore>);

        let first = curator.run_deduplication(false).await.unwrap();
        assert_eq!(first.duplicate_groups, 1);
        assert_eq!(first.deleted_resources, 2);
        assert!(first.errors.is_empty());

        let second = curator.run_deduplication(false).await.unwrap();
        assert_eq!(second.duplicate_groups, 0);
        assert_eq!(second.deleted_resources, 0);
        assert_eq!(second.total_resources, 1);
    }

    #[tokio::test]
    async fn highest_quality_record_survives() {
        let store = Arc::new(MemoryStore::new());
        let make = |source: &str| {
            let mut r = resource();
            r.source = Some(source.to_string());
            r.source_url = Some("https://example.com/shared".to_string());
            r
        };
        store.insert_resource(make("hackernews"));
        store.insert_resource(make("arxiv"));
        let arxiv_id = store.list_resources().await.unwrap()[1].id;

        let curator = Curator::new(store.clone() as Arc<dyn RecordStore>);
        curator.run_deduplication(false).await.unwrap();

        let survivors = store.list_resources().await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].id, arxiv_id);
    }

    #[tokio::test]
    async fn repair_then_verify_is_consistent() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw_data(crate::testing::raw_data(
            "youtube",
            Some("abc123"),
            serde_json::json!({"snippet": {"title": "A Video"}}),
        ));

        let curator = Curator::new(store.clone() as Arc<dyn RecordStore>);
        let stats = curator.run_relation_repair(false).await.unwrap();
        assert_eq!(stats.created, 1);

        let summary = curator.verify_bidirectional_links().await.unwrap();
        assert!(summary.is_consistent());
        assert_eq!(summary.resources_with_raw_data, 1);
    }
}
