//! Relation repair: re-link orphaned raw records to the catalog.
//!
//! For every raw record with no resource pointer, derive canonical fields
//! from its source-specific payload, then either link it to an existing
//! resource (matched by external id or URL) or create a new resource —
//! restoring the bidirectional Resource ↔ RawData invariant. A separate
//! read-only pass verifies that invariant across the whole store.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use lodestone_common::{NewResource, RawData, ResourceType};
use lodestone_store::RecordStore;

use crate::normalize::normalize_url;
use crate::payload::SourcePayload;
use crate::report::{FixStats, LinkInconsistency, VerificationSummary};

/// What happened to one orphan.
enum FixOutcome {
    Linked { resource_id: Uuid },
    Created { resource_id: Option<Uuid> },
    Skipped { reason: &'static str },
}

pub struct RelationRepair {
    store: Arc<dyn RecordStore>,
}

impl RelationRepair {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Repair every orphaned raw record. Per-record failures are captured
    /// into the stats; only the initial orphan query can abort the run.
    pub async fn run(&self, dry_run: bool) -> Result<FixStats> {
        let orphans = self.store.list_orphan_raw_data().await?;
        let mut stats = FixStats::start(orphans.len() as u64, dry_run);
        info!(orphans = orphans.len(), dry_run, "Relation repair starting");

        for raw in &orphans {
            match self.fix_one(raw, dry_run).await {
                Ok(FixOutcome::Linked { resource_id }) => {
                    info!(raw_data_id = %raw.id, resource_id = %resource_id, source = raw.source.as_str(), "Linked orphan to existing resource");
                    stats.record_linked(&raw.source);
                }
                Ok(FixOutcome::Created { resource_id }) => {
                    info!(raw_data_id = %raw.id, resource_id = ?resource_id, source = raw.source.as_str(), "Created resource for orphan");
                    stats.record_created(&raw.source);
                }
                Ok(FixOutcome::Skipped { reason }) => {
                    stats.record_skipped(reason);
                }
                Err(err) => {
                    warn!(raw_data_id = %raw.id, error = %err, "Failed to repair orphan");
                    stats.record_error(raw.id, &err.to_string());
                }
            }
        }

        stats.finish();
        Ok(stats)
    }

    async fn fix_one(&self, raw: &RawData, dry_run: bool) -> Result<FixOutcome> {
        let extracted = SourcePayload::parse(&raw.source, &raw.data)
            .extract(raw.external_id.as_deref());

        if extracted.source_url.is_empty() {
            return Ok(FixOutcome::Skipped {
                reason: "No valid URL",
            });
        }

        // Match by external id first, then fall back to the last segment
        // of the normalized URL. The segment heuristic can false-positive
        // on short or generic path tails; accepted as a precision risk.
        let mut existing = None;
        if let Some(external_id) = raw.external_id.as_deref().filter(|id| !id.is_empty()) {
            existing = self.store.find_resource_by_external_ref(external_id).await?;
        }
        if existing.is_none() {
            let normalized = normalize_url(&extracted.source_url);
            if let Some(segment) = last_path_segment(&normalized) {
                existing = self.store.find_resource_by_url_fragment(segment).await?;
            }
        }

        match existing {
            Some(existing) => {
                if !dry_run {
                    self.store.link_raw_data(raw.id, existing.id).await?;
                    // First writer wins on the resource side: never
                    // overwrite an established back-pointer.
                    if existing.raw_data_id.is_none() {
                        self.store.set_resource_raw_data(existing.id, raw.id).await?;
                    }
                }
                Ok(FixOutcome::Linked {
                    resource_id: existing.id,
                })
            }
            None => {
                if dry_run {
                    return Ok(FixOutcome::Created { resource_id: None });
                }
                let created = self
                    .store
                    .create_resource(&NewResource {
                        resource_type: ResourceType::infer_from_source(&raw.source),
                        title: extracted.title,
                        abstract_text: extracted.abstract_text,
                        source_url: extracted.source_url,
                        authors: extracted.authors,
                        published_at: extracted.published_at,
                        source: raw.source.clone(),
                        external_id: raw.external_id.clone(),
                        raw_data_id: raw.id,
                    })
                    .await?;
                self.store.link_raw_data(raw.id, created.id).await?;
                Ok(FixOutcome::Created {
                    resource_id: Some(created.id),
                })
            }
        }
    }

    /// Read-only cross-check: for every resource pointing at a raw record,
    /// does that raw record point back? Reports inconsistencies and link
    /// coverage; fixes nothing.
    pub async fn verify(&self) -> Result<VerificationSummary> {
        let links = self.store.list_resource_raw_links().await?;

        let mut inconsistencies = Vec::new();
        for (resource_id, raw_data_id) in links {
            let Some(raw) = self.store.find_raw_data(raw_data_id).await? else {
                continue;
            };
            if raw.resource_id != Some(resource_id) {
                inconsistencies.push(LinkInconsistency {
                    resource_id,
                    raw_data_id,
                    actual_resource_id: raw.resource_id,
                });
            }
        }

        Ok(VerificationSummary {
            inconsistencies,
            total_raw_data: self.store.count_raw_data().await?,
            linked_raw_data: self.store.count_linked_raw_data().await?,
            total_resources: self.store.count_resources().await?,
            resources_with_raw_data: self.store.count_resources_with_raw_data().await?,
        })
    }
}

/// Last path segment of a normalized URL. Empty segments never match —
/// a `contains("")` lookup would hit every resource in the store.
fn last_path_segment(url: &str) -> Option<&str> {
    let segment = url.rsplit('/').next().unwrap_or_default();
    (!segment.is_empty()).then_some(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_data, resource};
    use lodestone_store::MemoryStore;
    use serde_json::json;

    fn repair(store: &Arc<MemoryStore>) -> RelationRepair {
        RelationRepair::new(store.clone() as Arc<dyn RecordStore>)
    }

    #[test]
    fn last_segment_of_url() {
        assert_eq!(last_path_segment("https://example.com/a/b"), Some("b"));
        assert_eq!(last_path_segment(""), None);
    }

    #[tokio::test]
    async fn creates_typed_resource_for_unmatched_github_orphan() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw_data(raw_data(
            "github",
            Some("foo/bar"),
            json!({"full_name": "foo/bar", "html_url": "https://github.com/foo/bar",
                   "owner": {"login": "foo"}}),
        ));

        let stats = repair(&store).run(false).await.unwrap();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.by_source["github"].created, 1);

        let resources = store.list_resources().await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_type, ResourceType::Project);
        assert_eq!(resources[0].title.as_deref(), Some("foo/bar"));

        // bidirectional link established
        let raw = store.raw_data();
        assert_eq!(raw[0].resource_id, Some(resources[0].id));
        assert_eq!(resources[0].raw_data_id, Some(raw[0].id));
    }

    #[tokio::test]
    async fn links_orphan_to_existing_resource_by_external_id() {
        let store = Arc::new(MemoryStore::new());
        let mut existing = resource();
        existing.external_id = Some("2401.12345".to_string());
        existing.source_url = Some("https://arxiv.org/abs/2401.12345".to_string());
        let existing_id = existing.id;
        store.insert_resource(existing);
        store.insert_raw_data(raw_data(
            "arxiv",
            Some("2401.12345"),
            json!({"title": "A Paper", "link": "https://arxiv.org/abs/2401.12345"}),
        ));

        let stats = repair(&store).run(false).await.unwrap();
        assert_eq!(stats.linked, 1);
        assert_eq!(stats.created, 0);

        let raw = store.raw_data();
        assert_eq!(raw[0].resource_id, Some(existing_id));
        // back-pointer filled in because the resource had none
        let linked = store.find_resource(existing_id).await.unwrap().unwrap();
        assert_eq!(linked.raw_data_id, Some(raw[0].id));
    }

    #[tokio::test]
    async fn link_does_not_overwrite_existing_back_pointer() {
        let store = Arc::new(MemoryStore::new());
        let prior_raw_id = Uuid::new_v4();
        let mut existing = resource();
        existing.external_id = Some("ext-1".to_string());
        existing.raw_data_id = Some(prior_raw_id);
        let existing_id = existing.id;
        store.insert_resource(existing);
        store.insert_raw_data(raw_data(
            "generic",
            Some("ext-1"),
            json!({"title": "Anything", "url": "https://example.com/items/ext-1"}),
        ));

        repair(&store).run(false).await.unwrap();

        let linked = store.find_resource(existing_id).await.unwrap().unwrap();
        assert_eq!(linked.raw_data_id, Some(prior_raw_id));
    }

    #[tokio::test]
    async fn links_by_url_segment_when_no_external_id_match() {
        let store = Arc::new(MemoryStore::new());
        let mut existing = resource();
        existing.source_url = Some("https://blog.example.com/posts/a-very-specific-slug".to_string());
        let existing_id = existing.id;
        store.insert_resource(existing);
        store.insert_raw_data(raw_data(
            "rss",
            None,
            json!({"title": "A Post", "link": "https://blog.example.com/posts/a-very-specific-slug"}),
        ));

        let stats = repair(&store).run(false).await.unwrap();
        assert_eq!(stats.linked, 1);
        assert_eq!(store.raw_data()[0].resource_id, Some(existing_id));
    }

    #[tokio::test]
    async fn orphan_without_url_is_skipped_with_reason() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw_data(raw_data("rss", None, json!({"title": "No Link Here"})));

        let stats = repair(&store).run(false).await.unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.created, 0);
        assert_eq!(stats.skip_reasons["No valid URL"], 1);
        assert!(store.list_resources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw_data(raw_data(
            "github",
            Some("foo/bar"),
            json!({"html_url": "https://github.com/foo/bar"}),
        ));

        let stats = repair(&store).run(true).await.unwrap();
        assert_eq!(stats.created, 1);
        assert!(store.list_resources().await.unwrap().is_empty());
        assert_eq!(store.raw_data()[0].resource_id, None);
    }

    #[tokio::test]
    async fn verify_is_clean_after_execute_run() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw_data(raw_data(
            "github",
            Some("foo/bar"),
            json!({"html_url": "https://github.com/foo/bar"}),
        ));
        store.insert_raw_data(raw_data(
            "hackernews",
            Some("38000000"),
            json!({"title": "Show HN: A Thing That Does Things"}),
        ));

        let job = repair(&store);
        job.run(false).await.unwrap();
        let summary = job.verify().await.unwrap();

        assert!(summary.is_consistent());
        assert_eq!(summary.raw_link_coverage(), 100.0);
    }

    #[tokio::test]
    async fn verify_reports_mismatched_back_pointer() {
        let store = Arc::new(MemoryStore::new());
        let mut raw = raw_data("rss", None, json!({}));
        let raw_id = raw.id;
        raw.resource_id = Some(Uuid::new_v4()); // points somewhere else
        store.insert_raw_data(raw);

        let mut res = resource();
        res.raw_data_id = Some(raw_id);
        let resource_id = res.id;
        store.insert_resource(res);

        let summary = repair(&store).verify().await.unwrap();
        assert_eq!(summary.inconsistencies.len(), 1);
        assert_eq!(summary.inconsistencies[0].resource_id, resource_id);
        assert_eq!(summary.inconsistencies[0].raw_data_id, raw_id);
    }
}
