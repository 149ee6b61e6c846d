//! Relational persistence for documents and chunk rows.
//!
//! The orchestrator treats each operation as atomic (single-row or a
//! single transaction), but never wraps the whole pipeline in one
//! cross-store transaction.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::models::{Chunk, DatabaseConfig, DocumentStatus};

/// Document-record operations consumed by the pipeline.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Owning class of a document; fails if the document row is missing.
    async fn read_class_id(&self, document_id: Uuid) -> Result<Uuid, PersistenceError>;

    /// Write all chunk rows for one run in a single transaction,
    /// overwriting any rows left by a previous delivery of the same
    /// document.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<(), PersistenceError>;

    async fn update_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> Result<(), PersistenceError>;

    async fn document_status(&self, document_id: Uuid)
    -> Result<DocumentStatus, PersistenceError>;

    async fn chunk_count(&self, document_id: Uuid) -> Result<u64, PersistenceError>;

    /// Remove all chunk rows for a document, returning how many went away.
    async fn delete_chunks(&self, document_id: Uuid) -> Result<u64, PersistenceError>;

    async fn health_check(&self) -> Result<bool, PersistenceError>;
}

/// PostgreSQL-backed document store.
///
/// Holds a connection pool shared across concurrent document runs; each
/// operation acquires its own connection.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs.into()))
            .connect(&config.url)
            .await
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn read_class_id(&self, document_id: Uuid) -> Result<Uuid, PersistenceError> {
        let row = sqlx::query("SELECT class_id FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        let row =
            row.ok_or_else(|| PersistenceError::DocumentNotFound(document_id.to_string()))?;
        Ok(row.try_get("class_id")?)
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<(), PersistenceError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (document_id, chunk_index, content, page_number, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (document_id, chunk_index)
                DO UPDATE SET content = EXCLUDED.content, page_number = EXCLUDED.page_number
                "#,
            )
            .bind(chunk.document_id)
            .bind(chunk.chunk_index as i32)
            .bind(&chunk.content)
            .bind(chunk.page_number as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn update_status(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> Result<(), PersistenceError> {
        let result =
            sqlx::query("UPDATE documents SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(status.to_string())
                .bind(document_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::DocumentNotFound(document_id.to_string()));
        }
        Ok(())
    }

    async fn document_status(
        &self,
        document_id: Uuid,
    ) -> Result<DocumentStatus, PersistenceError> {
        let row = sqlx::query("SELECT status FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        let row =
            row.ok_or_else(|| PersistenceError::DocumentNotFound(document_id.to_string()))?;
        let status: String = row.try_get("status")?;
        status
            .parse()
            .map_err(|_| PersistenceError::DocumentNotFound(format!("bad status: {}", status)))
    }

    async fn chunk_count(&self, document_id: Uuid) -> Result<u64, PersistenceError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn delete_chunks(&self, document_id: Uuid) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<bool, PersistenceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))
    }
}
