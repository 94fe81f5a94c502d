//! Postgres [`RecordStore`] backed by an sqlx connection pool.
//!
//! Queries use the runtime API (no compile-time schema checks), so the
//! crate builds without a live database. Schema setup is handled by the
//! idempotent [`PgStore::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use lodestone_common::{
    DeduplicationRecord, NewResource, RawData, Resource, ResourcePatch, ResourceType,
};

use crate::{RecordStore, Result, StoreError};

/// Thin wrapper around an sqlx `PgPool` providing connection setup.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres with the given pool size.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run idempotent schema migrations: tables, then indexes.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running schema migrations...");

        let statements = [
            "CREATE TABLE IF NOT EXISTS resources (
                id UUID PRIMARY KEY,
                resource_type TEXT NOT NULL,
                title TEXT,
                abstract_text TEXT,
                content TEXT,
                ai_summary TEXT,
                source TEXT,
                source_url TEXT,
                external_id TEXT,
                authors TEXT[],
                published_at TIMESTAMPTZ,
                citation_count BIGINT,
                raw_data_id UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS raw_data (
                id UUID PRIMARY KEY,
                source TEXT NOT NULL,
                external_id TEXT,
                data JSONB NOT NULL,
                resource_id UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS dedup_records (
                id UUID PRIMARY KEY,
                resource_id UUID NOT NULL,
                duplicate_of_id UUID NOT NULL,
                method TEXT NOT NULL,
                similarity DOUBLE PRECISION NOT NULL,
                decision TEXT NOT NULL,
                merged_ids UUID[] NOT NULL,
                processed_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE INDEX IF NOT EXISTS idx_resources_external_id ON resources (external_id)",
            "CREATE INDEX IF NOT EXISTS idx_resources_raw_data_id ON resources (raw_data_id)",
            "CREATE INDEX IF NOT EXISTS idx_raw_data_resource_id ON raw_data (resource_id)",
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Schema migrations complete");
        Ok(())
    }
}

// --- Row mapping ---

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    resource_type: String,
    title: Option<String>,
    abstract_text: Option<String>,
    content: Option<String>,
    ai_summary: Option<String>,
    source: Option<String>,
    source_url: Option<String>,
    external_id: Option<String>,
    authors: Option<Vec<String>>,
    published_at: Option<DateTime<Utc>>,
    citation_count: Option<i64>,
    raw_data_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Resource {
            id: row.id,
            resource_type: ResourceType::parse(&row.resource_type),
            title: row.title,
            abstract_text: row.abstract_text,
            content: row.content,
            ai_summary: row.ai_summary,
            source: row.source,
            source_url: row.source_url,
            external_id: row.external_id,
            authors: row.authors,
            published_at: row.published_at,
            citation_count: row.citation_count,
            raw_data_id: row.raw_data_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RawDataRow {
    id: Uuid,
    source: String,
    external_id: Option<String>,
    data: Value,
    resource_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<RawDataRow> for RawData {
    fn from(row: RawDataRow) -> Self {
        RawData {
            id: row.id,
            source: row.source,
            external_id: row.external_id,
            data: row.data,
            resource_id: row.resource_id,
            created_at: row.created_at,
        }
    }
}

const RESOURCE_COLUMNS: &str = "id, resource_type, title, abstract_text, content, ai_summary, \
     source, source_url, external_id, authors, published_at, citation_count, \
     raw_data_id, created_at, updated_at";

#[async_trait]
impl RecordStore for PgStore {
    async fn list_resources(&self) -> Result<Vec<Resource>> {
        let rows = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Resource::from).collect())
    }

    async fn count_resources(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn find_resource(&self, id: Uuid) -> Result<Option<Resource>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Resource::from))
    }

    async fn find_resource_by_external_ref(&self, external_id: &str) -> Result<Option<Resource>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources
             WHERE external_id = $1 OR source_url LIKE '%' || $1 || '%'
             ORDER BY created_at ASC, id ASC
             LIMIT 1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Resource::from))
    }

    async fn find_resource_by_url_fragment(&self, fragment: &str) -> Result<Option<Resource>> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources
             WHERE source_url LIKE '%' || $1 || '%'
             ORDER BY created_at ASC, id ASC
             LIMIT 1"
        ))
        .bind(fragment)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Resource::from))
    }

    async fn update_resource(&self, id: Uuid, patch: &ResourcePatch) -> Result<()> {
        let result = sqlx::query(
            "UPDATE resources SET
                title = COALESCE($2, title),
                abstract_text = COALESCE($3, abstract_text),
                content = COALESCE($4, content),
                ai_summary = COALESCE($5, ai_summary),
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(patch.abstract_text.as_deref())
        .bind(patch.content.as_deref())
        .bind(patch.ai_summary.as_deref())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn create_resource(&self, new: &NewResource) -> Result<Resource> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            "INSERT INTO resources
                (id, resource_type, title, abstract_text, source, source_url,
                 external_id, authors, published_at, raw_data_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.resource_type.as_str())
        .bind(&new.title)
        .bind(new.abstract_text.as_deref())
        .bind(&new.source)
        .bind(&new.source_url)
        .bind(new.external_id.as_deref())
        .bind(new.authors.as_deref())
        .bind(new.published_at)
        .bind(new.raw_data_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn delete_resources(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM resources WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_resource_raw_data(&self, resource_id: Uuid, raw_data_id: Uuid) -> Result<()> {
        let result =
            sqlx::query("UPDATE resources SET raw_data_id = $2, updated_at = now() WHERE id = $1")
                .bind(resource_id)
                .bind(raw_data_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(resource_id));
        }
        Ok(())
    }

    async fn count_resources_with_raw_data(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM resources WHERE raw_data_id IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn list_resource_raw_links(&self) -> Result<Vec<(Uuid, Uuid)>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT id, raw_data_id FROM resources WHERE raw_data_id IS NOT NULL
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_orphan_raw_data(&self) -> Result<Vec<RawData>> {
        let rows = sqlx::query_as::<_, RawDataRow>(
            "SELECT id, source, external_id, data, resource_id, created_at
             FROM raw_data WHERE resource_id IS NULL
             ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RawData::from).collect())
    }

    async fn find_raw_data(&self, id: Uuid) -> Result<Option<RawData>> {
        let row = sqlx::query_as::<_, RawDataRow>(
            "SELECT id, source, external_id, data, resource_id, created_at
             FROM raw_data WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RawData::from))
    }

    async fn link_raw_data(&self, raw_data_id: Uuid, resource_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE raw_data SET resource_id = $2 WHERE id = $1")
            .bind(raw_data_id)
            .bind(resource_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(raw_data_id));
        }
        Ok(())
    }

    async fn repoint_raw_data(
        &self,
        from_resource_ids: &[Uuid],
        to_resource_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("UPDATE raw_data SET resource_id = $2 WHERE resource_id = ANY($1)")
            .bind(from_resource_ids)
            .bind(to_resource_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_raw_data(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_linked_raw_data(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM raw_data WHERE resource_id IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn count_raw_data_for_resources(&self, resource_ids: &[Uuid]) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM raw_data WHERE resource_id = ANY($1)")
                .bind(resource_ids)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn insert_dedup_record(&self, record: &DeduplicationRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO dedup_records
                (id, resource_id, duplicate_of_id, method, similarity, decision,
                 merged_ids, processed_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.resource_id)
        .bind(record.duplicate_of_id)
        .bind(record.method.as_str())
        .bind(record.similarity)
        .bind(&record.decision)
        .bind(&record.merged_ids)
        .bind(&record.processed_by)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
