//! Qdrant vector store gateway.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use uuid::Uuid;

use crate::error::VectorStoreError;
use crate::models::{Chunk, VectorStoreConfig};

/// Store-side operations the orchestrator needs from the vector index.
///
/// Batch atomicity inside `upsert` is a store-level concern; callers
/// must not assume partial writes are prevented here.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it doesn't exist. Idempotent.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Write one point per chunk in a single batch call.
    ///
    /// `vectors` is parallel to `chunks`; point ids are deterministic
    /// per `(document_id, chunk_index)` so re-delivery overwrites.
    async fn upsert(
        &self,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), VectorStoreError>;

    /// Delete all points whose payload document_id matches.
    ///
    /// A missing collection or zero matching points is not an error.
    async fn delete_by_document(&self, document_id: Uuid) -> Result<(), VectorStoreError>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Number of points currently in the collection, if it exists.
    async fn points_count(&self) -> Result<Option<u64>, VectorStoreError>;
}

/// Qdrant-backed vector index.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimension: u64,
}

impl QdrantVectorStore {
    pub fn new(config: &VectorStoreConfig, dimension: usize) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: dimension as u64,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn is_missing_collection(msg: &str) -> bool {
        msg.contains("not found") || msg.contains("doesn't exist")
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorStore {
    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine));

        match self.client.create_collection(create_collection).await {
            Ok(_) => Ok(()),
            // Creating a collection that already exists is fine
            Err(e) if e.to_string().contains("already exists") => Ok(()),
            Err(e) => Err(VectorStoreError::CollectionError(e.to_string())),
        }
    }

    async fn upsert(
        &self,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), VectorStoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks.len() != vectors.len() {
            return Err(VectorStoreError::UpsertError(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert(
                    "document_id".to_string(),
                    chunk.document_id.to_string().into(),
                );
                payload.insert(
                    "chunk_index".to_string(),
                    i64::from(chunk.chunk_index).into(),
                );
                payload.insert("content".to_string(), chunk.content.clone().into());
                payload.insert(
                    "page_number".to_string(),
                    i64::from(chunk.page_number).into(),
                );
                for (key, value) in &chunk.metadata {
                    payload.insert(key.clone(), value.clone().into());
                }

                let point_id = Chunk::point_id(chunk.document_id, chunk.chunk_index);
                PointStruct::new(point_id.to_string(), vector, payload)
            })
            .collect();

        let upsert = UpsertPointsBuilder::new(&self.collection, points);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<(), VectorStoreError> {
        let filter = Filter::must([Condition::matches(
            "document_id",
            document_id.to_string(),
        )]);
        let delete = DeletePointsBuilder::new(&self.collection).points(filter);

        match self.client.delete_points(delete).await {
            Ok(_) => Ok(()),
            Err(e) if Self::is_missing_collection(&e.to_string()) => Ok(()),
            Err(e) => Err(VectorStoreError::DeleteError(e.to_string())),
        }
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn points_count(&self) -> Result<Option<u64>, VectorStoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => Ok(Some(
                info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
            )),
            Err(e) => {
                let msg = e.to_string();
                if Self::is_missing_collection(&msg) {
                    Ok(None)
                } else {
                    Err(VectorStoreError::CollectionError(msg))
                }
            }
        }
    }
}
