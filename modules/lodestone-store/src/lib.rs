//! Storage abstraction for the Lodestone catalog.
//!
//! The [`RecordStore`] trait defines every store operation the
//! reconciliation engine needs, enabling pluggable backends: Postgres in
//! production, [`MemoryStore`] for tests and local runs. Implementations
//! must be `Send + Sync`; the engine holds one as `Arc<dyn RecordStore>`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use lodestone_common::{DeduplicationRecord, NewResource, RawData, Resource, ResourcePatch};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("record not found: {0}")]
    NotFound(Uuid),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Abstract record store consumed by the reconciliation engine.
///
/// Listing order is part of the contract: [`list_resources`] returns records
/// in stable insertion (creation) order, which the duplicate detector relies
/// on for deterministic tie-breaks, and [`list_orphan_raw_data`] returns
/// newest-first.
///
/// [`list_resources`]: RecordStore::list_resources
/// [`list_orphan_raw_data`]: RecordStore::list_orphan_raw_data
#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Resources ---

    /// All resources, in creation order.
    async fn list_resources(&self) -> Result<Vec<Resource>>;

    async fn count_resources(&self) -> Result<u64>;

    async fn find_resource(&self, id: Uuid) -> Result<Option<Resource>>;

    /// First resource whose `external_id` equals the given id, or whose
    /// `source_url` contains it.
    async fn find_resource_by_external_ref(&self, external_id: &str) -> Result<Option<Resource>>;

    /// First resource whose `source_url` contains the given fragment.
    async fn find_resource_by_url_fragment(&self, fragment: &str) -> Result<Option<Resource>>;

    /// Apply non-`None` patch fields to a resource. Errors with
    /// [`StoreError::NotFound`] if the resource no longer exists.
    async fn update_resource(&self, id: Uuid, patch: &ResourcePatch) -> Result<()>;

    async fn create_resource(&self, new: &NewResource) -> Result<Resource>;

    /// Bulk delete; returns how many rows went away.
    async fn delete_resources(&self, ids: &[Uuid]) -> Result<u64>;

    /// Set the resource-side back-pointer of the bidirectional link.
    async fn set_resource_raw_data(&self, resource_id: Uuid, raw_data_id: Uuid) -> Result<()>;

    async fn count_resources_with_raw_data(&self) -> Result<u64>;

    /// `(resource_id, raw_data_id)` for every resource carrying a
    /// back-pointer. Used by link verification.
    async fn list_resource_raw_links(&self) -> Result<Vec<(Uuid, Uuid)>>;

    // --- Raw data ---

    /// Raw records with no linked resource, newest first.
    async fn list_orphan_raw_data(&self) -> Result<Vec<RawData>>;

    async fn find_raw_data(&self, id: Uuid) -> Result<Option<RawData>>;

    /// Set the raw-side forward pointer of the bidirectional link.
    async fn link_raw_data(&self, raw_data_id: Uuid, resource_id: Uuid) -> Result<()>;

    /// Repoint every raw record referencing one of `from_resource_ids` to
    /// `to_resource_id`. Returns how many rows changed.
    async fn repoint_raw_data(&self, from_resource_ids: &[Uuid], to_resource_id: Uuid)
        -> Result<u64>;

    async fn count_raw_data(&self) -> Result<u64>;

    async fn count_linked_raw_data(&self) -> Result<u64>;

    /// How many raw records currently reference one of the given resources.
    /// Read-only; lets dry-run merges preview relation updates.
    async fn count_raw_data_for_resources(&self, resource_ids: &[Uuid]) -> Result<u64>;

    // --- Audit ---

    /// Append a merge decision to the audit trail.
    async fn insert_dedup_record(&self, record: &DeduplicationRecord) -> Result<()>;
}
