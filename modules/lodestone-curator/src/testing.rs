//! Shared test fixtures for engine tests.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use lodestone_common::{RawData, Resource, ResourceType};

/// A blank resource; tests set only the fields they exercise.
pub(crate) fn resource() -> Resource {
    let now = Utc::now();
    Resource {
        id: Uuid::new_v4(),
        resource_type: ResourceType::Paper,
        title: None,
        abstract_text: None,
        content: None,
        ai_summary: None,
        source: None,
        source_url: None,
        external_id: None,
        authors: None,
        published_at: None,
        citation_count: None,
        raw_data_id: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn raw_data(source: &str, external_id: Option<&str>, data: Value) -> RawData {
    RawData {
        id: Uuid::new_v4(),
        source: source.to_string(),
        external_id: external_id.map(str::to_string),
        data,
        resource_id: None,
        created_at: Utc::now(),
    }
}
