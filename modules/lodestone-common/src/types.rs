use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// --- Catalog entities ---

/// Kind of catalog entry, inferred from the ingestion source when a resource
/// is created by relation repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Paper,
    Project,
    News,
    YoutubeVideo,
    Blog,
    Rss,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Paper => "PAPER",
            ResourceType::Project => "PROJECT",
            ResourceType::News => "NEWS",
            ResourceType::YoutubeVideo => "YOUTUBE_VIDEO",
            ResourceType::Blog => "BLOG",
            ResourceType::Rss => "RSS",
        }
    }

    /// Parse a stored type string. Unrecognized values fall back to `Blog`,
    /// matching [`ResourceType::infer_from_source`]'s default.
    pub fn parse(s: &str) -> Self {
        match s {
            "PAPER" => ResourceType::Paper,
            "PROJECT" => ResourceType::Project,
            "NEWS" => ResourceType::News,
            "YOUTUBE_VIDEO" => ResourceType::YoutubeVideo,
            "RSS" => ResourceType::Rss,
            _ => ResourceType::Blog,
        }
    }

    /// Fixed source → type lookup used when relation repair has to create a
    /// resource for an orphaned raw record.
    pub fn infer_from_source(source: &str) -> Self {
        match source.to_lowercase().as_str() {
            "arxiv" | "semantic_scholar" | "ieee" | "acm" | "openreview" => ResourceType::Paper,
            "github" | "gitlab" => ResourceType::Project,
            "hackernews" | "techcrunch" | "venturebeat" => ResourceType::News,
            "youtube" => ResourceType::YoutubeVideo,
            "medium" | "devto" | "substack" | "blog" => ResourceType::Blog,
            "rss" => ResourceType::Rss,
            _ => ResourceType::Blog,
        }
    }
}

/// A canonical catalog entry. Every field the engine reads is optional —
/// absence is meaningful (it lowers the quality score and loses merge
/// comparisons).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub resource_type: ResourceType,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub content: Option<String>,
    pub ai_summary: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub external_id: Option<String>,
    pub authors: Option<Vec<String>>,
    pub published_at: Option<DateTime<Utc>>,
    pub citation_count: Option<i64>,
    /// Back-pointer to the raw record this resource was ingested from.
    pub raw_data_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The raw payload captured at ingestion time, before extraction into a
/// [`Resource`]. `resource_id` is the forward half of the bidirectional
/// link; it is `None` for orphans awaiting relation repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawData {
    pub id: Uuid,
    pub source: String,
    pub external_id: Option<String>,
    pub data: Value,
    pub resource_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// --- Write shapes ---

/// Field-level updates applied to a canonical resource during a merge.
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub content: Option<String>,
    pub ai_summary: Option<String>,
}

impl ResourcePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.abstract_text.is_none()
            && self.content.is_none()
            && self.ai_summary.is_none()
    }
}

/// A resource to be created by relation repair for an orphaned raw record.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub resource_type: ResourceType,
    pub title: String,
    pub abstract_text: Option<String>,
    pub source_url: String,
    pub authors: Option<Vec<String>>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    pub external_id: Option<String>,
    pub raw_data_id: Uuid,
}

// --- Deduplication ---

/// Which detection pass produced a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    UrlMatch,
    TitleSimilarity,
    ContentFingerprint,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::UrlMatch => "url_match",
            DetectionMethod::TitleSimilarity => "title_similarity",
            DetectionMethod::ContentFingerprint => "content_fingerprint",
        }
    }
}

/// A detection-time grouping: one canonical record and the duplicates that
/// will be merged into it. In-memory only; the persisted audit trail is
/// [`DeduplicationRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub canonical_id: Uuid,
    pub duplicate_ids: Vec<Uuid>,
    pub reason: DetectionMethod,
    pub similarity: f64,
}

/// Append-only audit entry, one per executed merge. Never mutated or
/// deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationRecord {
    pub id: Uuid,
    /// The surviving canonical resource.
    pub resource_id: Uuid,
    /// One representative merged-away duplicate.
    pub duplicate_of_id: Uuid,
    pub method: DetectionMethod,
    pub similarity: f64,
    pub decision: String,
    /// Every resource id absorbed in this merge.
    pub merged_ids: Vec<Uuid>,
    pub processed_by: String,
    pub created_at: DateTime<Utc>,
}
