//! In-memory [`RecordStore`] implementation for tests and local runs.
//!
//! Records live in `Vec`s behind a single `std::sync::Mutex`, preserving
//! insertion order so listing is deterministic. All lookups are linear
//! scans, which is fine at test scale.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use lodestone_common::{DeduplicationRecord, NewResource, RawData, Resource, ResourcePatch};

use crate::{RecordStore, Result, StoreError};

#[derive(Default)]
struct Inner {
    resources: Vec<Resource>,
    raw_data: Vec<RawData>,
    dedup_records: Vec<DeduplicationRecord>,
}

/// In-memory store. Seed it with [`insert_resource`](MemoryStore::insert_resource)
/// and [`insert_raw_data`](MemoryStore::insert_raw_data) before handing it to
/// the engine.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed resource (test seeding).
    pub fn insert_resource(&self, resource: Resource) {
        self.inner.lock().unwrap().resources.push(resource);
    }

    /// Insert a fully-formed raw record (test seeding).
    pub fn insert_raw_data(&self, raw: RawData) {
        self.inner.lock().unwrap().raw_data.push(raw);
    }

    /// Snapshot of the audit trail (test assertions).
    pub fn dedup_records(&self) -> Vec<DeduplicationRecord> {
        self.inner.lock().unwrap().dedup_records.clone()
    }

    /// Snapshot of all raw records (test assertions).
    pub fn raw_data(&self) -> Vec<RawData> {
        self.inner.lock().unwrap().raw_data.clone()
    }
}

fn url_contains(resource: &Resource, fragment: &str) -> bool {
    resource
        .source_url
        .as_deref()
        .is_some_and(|u| u.contains(fragment))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(self.inner.lock().unwrap().resources.clone())
    }

    async fn count_resources(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().resources.len() as u64)
    }

    async fn find_resource(&self, id: Uuid) -> Result<Option<Resource>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.resources.iter().find(|r| r.id == id).cloned())
    }

    async fn find_resource_by_external_ref(&self, external_id: &str) -> Result<Option<Resource>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .resources
            .iter()
            .find(|r| {
                r.external_id.as_deref() == Some(external_id) || url_contains(r, external_id)
            })
            .cloned())
    }

    async fn find_resource_by_url_fragment(&self, fragment: &str) -> Result<Option<Resource>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .resources
            .iter()
            .find(|r| url_contains(r, fragment))
            .cloned())
    }

    async fn update_resource(&self, id: Uuid, patch: &ResourcePatch) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let resource = inner
            .resources
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if let Some(title) = &patch.title {
            resource.title = Some(title.clone());
        }
        if let Some(abstract_text) = &patch.abstract_text {
            resource.abstract_text = Some(abstract_text.clone());
        }
        if let Some(content) = &patch.content {
            resource.content = Some(content.clone());
        }
        if let Some(ai_summary) = &patch.ai_summary {
            resource.ai_summary = Some(ai_summary.clone());
        }
        resource.updated_at = Utc::now();
        Ok(())
    }

    async fn create_resource(&self, new: &NewResource) -> Result<Resource> {
        let now = Utc::now();
        let resource = Resource {
            id: Uuid::new_v4(),
            resource_type: new.resource_type,
            title: Some(new.title.clone()),
            abstract_text: new.abstract_text.clone(),
            content: None,
            ai_summary: None,
            source: Some(new.source.clone()),
            source_url: Some(new.source_url.clone()),
            external_id: new.external_id.clone(),
            authors: new.authors.clone(),
            published_at: new.published_at,
            citation_count: None,
            raw_data_id: Some(new.raw_data_id),
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().resources.push(resource.clone());
        Ok(resource)
    }

    async fn delete_resources(&self, ids: &[Uuid]) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.resources.len();
        inner.resources.retain(|r| !ids.contains(&r.id));
        Ok((before - inner.resources.len()) as u64)
    }

    async fn set_resource_raw_data(&self, resource_id: Uuid, raw_data_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let resource = inner
            .resources
            .iter_mut()
            .find(|r| r.id == resource_id)
            .ok_or(StoreError::NotFound(resource_id))?;
        resource.raw_data_id = Some(raw_data_id);
        resource.updated_at = Utc::now();
        Ok(())
    }

    async fn count_resources_with_raw_data(&self) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .resources
            .iter()
            .filter(|r| r.raw_data_id.is_some())
            .count() as u64)
    }

    async fn list_resource_raw_links(&self) -> Result<Vec<(Uuid, Uuid)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .resources
            .iter()
            .filter_map(|r| r.raw_data_id.map(|raw_id| (r.id, raw_id)))
            .collect())
    }

    async fn list_orphan_raw_data(&self) -> Result<Vec<RawData>> {
        let inner = self.inner.lock().unwrap();
        let mut orphans: Vec<RawData> = inner
            .raw_data
            .iter()
            .filter(|r| r.resource_id.is_none())
            .cloned()
            .collect();
        orphans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orphans)
    }

    async fn find_raw_data(&self, id: Uuid) -> Result<Option<RawData>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.raw_data.iter().find(|r| r.id == id).cloned())
    }

    async fn link_raw_data(&self, raw_data_id: Uuid, resource_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let raw = inner
            .raw_data
            .iter_mut()
            .find(|r| r.id == raw_data_id)
            .ok_or(StoreError::NotFound(raw_data_id))?;
        raw.resource_id = Some(resource_id);
        Ok(())
    }

    async fn repoint_raw_data(
        &self,
        from_resource_ids: &[Uuid],
        to_resource_id: Uuid,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for raw in &mut inner.raw_data {
            if raw
                .resource_id
                .is_some_and(|id| from_resource_ids.contains(&id))
            {
                raw.resource_id = Some(to_resource_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_raw_data(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().raw_data.len() as u64)
    }

    async fn count_linked_raw_data(&self) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .raw_data
            .iter()
            .filter(|r| r.resource_id.is_some())
            .count() as u64)
    }

    async fn count_raw_data_for_resources(&self, resource_ids: &[Uuid]) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .raw_data
            .iter()
            .filter(|r| r.resource_id.is_some_and(|id| resource_ids.contains(&id)))
            .count() as u64)
    }

    async fn insert_dedup_record(&self, record: &DeduplicationRecord) -> Result<()> {
        self.inner.lock().unwrap().dedup_records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_common::ResourceType;

    fn resource(url: &str, external_id: Option<&str>) -> Resource {
        let now = Utc::now();
        Resource {
            id: Uuid::new_v4(),
            resource_type: ResourceType::Paper,
            title: Some("A Paper".to_string()),
            abstract_text: None,
            content: None,
            ai_summary: None,
            source: Some("arxiv".to_string()),
            source_url: Some(url.to_string()),
            external_id: external_id.map(str::to_string),
            authors: None,
            published_at: None,
            citation_count: None,
            raw_data_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let store = MemoryStore::new();
        let a = resource("https://example.com/a", None);
        let b = resource("https://example.com/b", None);
        let (id_a, id_b) = (a.id, b.id);
        store.insert_resource(a);
        store.insert_resource(b);

        let listed = store.list_resources().await.unwrap();
        assert_eq!(listed[0].id, id_a);
        assert_eq!(listed[1].id, id_b);
    }

    #[tokio::test]
    async fn external_ref_matches_id_or_url() {
        let store = MemoryStore::new();
        store.insert_resource(resource("https://arxiv.org/abs/2401.12345", None));
        store.insert_resource(resource("https://example.com/x", Some("gh-42")));

        let by_url = store
            .find_resource_by_external_ref("2401.12345")
            .await
            .unwrap();
        assert!(by_url.is_some());

        let by_id = store.find_resource_by_external_ref("gh-42").await.unwrap();
        assert!(by_id.is_some());

        let missing = store.find_resource_by_external_ref("nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn update_missing_resource_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_resource(Uuid::new_v4(), &ResourcePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn repoint_only_touches_matching_rows() {
        let store = MemoryStore::new();
        let keep = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let canonical = Uuid::new_v4();
        for (i, rid) in [Some(keep), Some(gone), None].into_iter().enumerate() {
            store.insert_raw_data(RawData {
                id: Uuid::new_v4(),
                source: "arxiv".to_string(),
                external_id: Some(format!("{i}")),
                data: serde_json::json!({}),
                resource_id: rid,
                created_at: Utc::now(),
            });
        }

        let updated = store.repoint_raw_data(&[gone], canonical).await.unwrap();
        assert_eq!(updated, 1);
        let raw = store.raw_data();
        assert!(raw.iter().any(|r| r.resource_id == Some(keep)));
        assert!(raw.iter().any(|r| r.resource_id == Some(canonical)));
        assert!(!raw.iter().any(|r| r.resource_id == Some(gone)));
    }

    #[tokio::test]
    async fn orphans_listed_newest_first() {
        let store = MemoryStore::new();
        let older = Utc::now() - chrono::Duration::hours(2);
        let newer = Utc::now();
        for (ext, ts) in [("old", older), ("new", newer)] {
            store.insert_raw_data(RawData {
                id: Uuid::new_v4(),
                source: "rss".to_string(),
                external_id: Some(ext.to_string()),
                data: serde_json::json!({}),
                resource_id: None,
                created_at: ts,
            });
        }

        let orphans = store.list_orphan_raw_data().await.unwrap();
        assert_eq!(orphans[0].external_id.as_deref(), Some("new"));
        assert_eq!(orphans[1].external_id.as_deref(), Some("old"));
    }
}
