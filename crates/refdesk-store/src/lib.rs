//! # Refdesk Store
//!
//! Postgres/pgvector implementation of the `DocumentIndex` capability.
//! Strictly read-only at query time: documents, chunks and TOC blobs
//! are created by the ingestion pipeline, never here.
//!
//! Probes run over an HNSW halfvec index with inner-product distance;
//! `hnsw.ef_search` is set on the checked-out connection before each
//! probe. A probe that misses its deadline surfaces as a retrieval
//! failure rather than being silently retried.

pub mod collection;

use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use refdesk_core::config::{DatabaseConfig, SearchConfig};
use refdesk_core::error::{RefdeskError, Result};
use refdesk_core::types::{DocumentInfo, FaqHit, ManualHit};

pub use collection::Collection;

/// Postgres-backed document index.
pub struct VectorStore {
    pool: PgPool,
    hnsw_ef_search: u32,
    query_timeout: Duration,
}

fn retrieval(e: sqlx::Error) -> RefdeskError {
    RefdeskError::Retrieval(e.to_string())
}

impl VectorStore {
    /// Connect a bounded pool and capture probe tuning.
    pub async fn connect(database: &DatabaseConfig, search: &SearchConfig) -> Result<Self> {
        if database.url.is_empty() {
            return Err(RefdeskError::Config(
                "database.url is empty and DATABASE_URL is not set".into(),
            ));
        }
        let pool = PgPoolOptions::new()
            .min_connections(database.min_connections)
            .max_connections(database.max_connections)
            .connect(&database.url)
            .await
            .map_err(|e| RefdeskError::Retrieval(format!("failed to connect to Postgres: {e}")))?;

        Ok(Self {
            pool,
            hnsw_ef_search: search.hnsw_ef_search,
            query_timeout: Duration::from_secs(database.query_timeout_secs),
        })
    }

    /// Apply fixture migrations (tables + HNSW indexes). Ingestion
    /// normally owns the schema; this exists for test databases.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RefdeskError::Retrieval(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run one ANN probe on a dedicated connection with `ef_search`
    /// applied, under the configured deadline.
    async fn probe_rows(
        &self,
        collection: Collection,
        embedding: &[f32],
        category: i16,
        limit: i64,
    ) -> Result<Vec<sqlx::postgres::PgRow>> {
        let vector = Vector::from(embedding.to_vec());
        let mut conn = self.pool.acquire().await.map_err(retrieval)?;

        sqlx::query(&format!("SET hnsw.ef_search = {}", self.hnsw_ef_search))
            .execute(&mut *conn)
            .await
            .map_err(retrieval)?;

        let query = sqlx::query(collection.probe_sql())
            .bind(&vector)
            .bind(category)
            .bind(limit)
            .fetch_all(&mut *conn);

        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(rows) => rows.map_err(retrieval),
            Err(_) => Err(RefdeskError::Retrieval(format!(
                "{} probe timed out after {:?}",
                collection.table(),
                self.query_timeout
            ))),
        }
    }
}

#[async_trait]
impl refdesk_core::traits::DocumentIndex for VectorStore {
    async fn manual_candidates(
        &self,
        embedding: &[f32],
        category: i16,
        limit: i64,
    ) -> Result<Vec<ManualHit>> {
        let rows = self
            .probe_rows(Collection::Manual, embedding, category, limit)
            .await?;
        tracing::debug!(category, rows = rows.len(), "manual probe returned");
        rows.into_iter()
            .map(|row| {
                Ok(ManualHit {
                    document_id: row.try_get("document_table_id").map_err(retrieval)?,
                    chunk_no: row.try_get("chunk_no").map_err(retrieval)?,
                    page: row.try_get("document_page").map_err(retrieval)?,
                    text: row.try_get("chunk_text").map_err(retrieval)?,
                    distance: row.try_get("distance").map_err(retrieval)?,
                })
            })
            .collect()
    }

    async fn faq_candidates(
        &self,
        embedding: &[f32],
        category: i16,
        limit: i64,
    ) -> Result<Vec<FaqHit>> {
        let rows = self
            .probe_rows(Collection::Faq, embedding, category, limit)
            .await?;
        tracing::debug!(category, rows = rows.len(), "faq probe returned");
        rows.into_iter()
            .map(|row| {
                Ok(FaqHit {
                    document_id: row.try_get("document_table_id").map_err(retrieval)?,
                    page: row.try_get("document_page").map_err(retrieval)?,
                    faq_no: row.try_get("faq_no").map_err(retrieval)?,
                    text: row.try_get("chunk_text").map_err(retrieval)?,
                    distance: row.try_get("distance").map_err(retrieval)?,
                })
            })
            .collect()
    }

    async fn document_info(&self, id: Uuid) -> Result<Option<DocumentInfo>> {
        let row = sqlx::query("SELECT file_path, file_name FROM document_table WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(retrieval)?;

        row.map(|row| {
            Ok(DocumentInfo {
                file_path: row.try_get("file_path").map_err(retrieval)?,
                file_name: row.try_get("file_name").map_err(retrieval)?,
            })
        })
        .transpose()
    }

    async fn document_id(&self, file_name: &str, category: i16) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            "SELECT dt.id \
             FROM document_table dt \
             JOIN document_category_table dct ON dt.id = dct.document_table_id \
             WHERE dt.file_name = $1 AND dct.business_category = $2",
        )
        .bind(file_name)
        .bind(category)
        .fetch_optional(&self.pool)
        .await
        .map_err(retrieval)?;

        row.map(|row| row.try_get("id").map_err(retrieval)).transpose()
    }

    async fn toc_text(&self, category: i16) -> Result<String> {
        let rows = sqlx::query(
            "SELECT tt.toc_data \
             FROM toc_table tt \
             JOIN document_table dt ON tt.document_table_id = dt.id \
             JOIN document_category_table dct ON dt.id = dct.document_table_id \
             WHERE dct.business_category = $1",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(retrieval)?;

        if rows.is_empty() {
            tracing::warn!(category, "no TOC data found");
            return Ok(String::new());
        }

        let blobs: Vec<String> = rows
            .into_iter()
            .map(|row| row.try_get("toc_data").map_err(retrieval))
            .collect::<Result<_>>()?;
        Ok(blobs.join("\n\n"))
    }

    async fn chunk_text_for_pages(
        &self,
        document_id: Uuid,
        start_page: i32,
        end_page: i32,
    ) -> Result<String> {
        let rows = sqlx::query(
            "SELECT chunk_text \
             FROM pdf_manual_table \
             WHERE document_table_id = $1 AND document_page BETWEEN $2 AND $3 \
             ORDER BY document_page, chunk_no",
        )
        .bind(document_id)
        .bind(start_page)
        .bind(end_page)
        .fetch_all(&self.pool)
        .await
        .map_err(retrieval)?;

        let chunks: Vec<String> = rows
            .into_iter()
            .map(|row| row.try_get("chunk_text").map_err(retrieval))
            .collect::<Result<_>>()?;
        Ok(chunks.join(" "))
    }

    async fn available_category_ids(&self) -> Result<Vec<i16>> {
        let rows = sqlx::query(
            "SELECT DISTINCT business_category \
             FROM document_category_table \
             ORDER BY business_category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(retrieval)?;

        rows.into_iter()
            .map(|row| row.try_get("business_category").map_err(retrieval))
            .collect()
    }
}
