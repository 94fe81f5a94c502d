//! Run reports — the engine's sole externally consumed artifact.
//!
//! Every run produces one serializable report struct, persisted as a JSON
//! file under `{DATA_DIR}/curator-runs/` for later inspection. Nothing in
//! here knows how reports are displayed.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

/// Serialize a run report to `{DATA_DIR}/curator-runs/{run_id}.json`.
pub fn save_report<T: Serialize>(run_id: &str, report: &T) -> Result<PathBuf> {
    let dir = data_dir().join("curator-runs");
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{run_id}.json"));
    fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    info!(path = %path.display(), "Run report saved");
    Ok(path)
}

// ---------------------------------------------------------------------------
// CleaningReport — deduplication runs
// ---------------------------------------------------------------------------

/// Aggregates for one deduplication run.
#[derive(Debug, Clone, Serialize)]
pub struct CleaningReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub total_resources: u64,
    pub duplicate_groups: u64,
    pub merged_resources: u64,
    pub deleted_resources: u64,
    pub updated_relations: u64,
    pub errors: Vec<String>,
}

impl CleaningReport {
    pub fn start(total_resources: u64, dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            total_resources,
            duplicate_groups: 0,
            merged_resources: 0,
            deleted_resources: 0,
            updated_relations: 0,
            errors: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// FixStats — relation repair runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceBreakdown {
    pub linked: u64,
    pub created: u64,
}

/// Aggregates for one relation-repair run, with per-source and per-skip-
/// reason breakdowns.
#[derive(Debug, Clone, Serialize)]
pub struct FixStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub total: u64,
    pub linked: u64,
    pub created: u64,
    pub skipped: u64,
    pub errors: u64,
    pub by_source: BTreeMap<String, SourceBreakdown>,
    pub skip_reasons: BTreeMap<String, u64>,
    pub error_details: Vec<String>,
}

impl FixStats {
    pub fn start(total: u64, dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            total,
            linked: 0,
            created: 0,
            skipped: 0,
            errors: 0,
            by_source: BTreeMap::new(),
            skip_reasons: BTreeMap::new(),
            error_details: Vec::new(),
        }
    }

    pub fn record_linked(&mut self, source: &str) {
        self.linked += 1;
        self.by_source.entry(source.to_string()).or_default().linked += 1;
    }

    pub fn record_created(&mut self, source: &str) {
        self.created += 1;
        self.by_source.entry(source.to_string()).or_default().created += 1;
    }

    pub fn record_skipped(&mut self, reason: &str) {
        self.skipped += 1;
        *self.skip_reasons.entry(reason.to_string()).or_default() += 1;
    }

    pub fn record_error(&mut self, raw_data_id: Uuid, message: &str) {
        self.errors += 1;
        self.error_details.push(format!("{raw_data_id}: {message}"));
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// VerificationSummary — bidirectional link check
// ---------------------------------------------------------------------------

/// A resource whose raw record does not point back at it.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInconsistency {
    pub resource_id: Uuid,
    pub raw_data_id: Uuid,
    /// Where the raw record actually points (`None` = unlinked).
    pub actual_resource_id: Option<Uuid>,
}

/// Read-only cross-check of the Resource ↔ RawData relation.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    pub inconsistencies: Vec<LinkInconsistency>,
    pub total_raw_data: u64,
    pub linked_raw_data: u64,
    pub total_resources: u64,
    pub resources_with_raw_data: u64,
}

impl VerificationSummary {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }

    /// Percentage of raw records linked to a resource.
    pub fn raw_link_coverage(&self) -> f64 {
        percentage(self.linked_raw_data, self.total_raw_data)
    }

    /// Percentage of resources carrying a raw-data back-pointer.
    pub fn resource_link_coverage(&self) -> f64 {
        percentage(self.resources_with_raw_data, self.total_resources)
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}
