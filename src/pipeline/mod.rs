//! The document ingestion state machine.
//!
//! One run takes a document from `processing` to a terminal
//! `processed`/`failed` status: fetch source bytes, extract pages,
//! chunk, embed, persist chunk rows, upsert vectors. Stages execute
//! strictly sequentially; any failure aborts the remaining stages,
//! triggers one best-effort `failed` status write, and re-raises so the
//! delivery substrate can apply its retry policy.

pub mod worker;

pub use worker::{DispatchError, IngestWorkerPool, TaskDispatcher};

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EmbeddingError, ExtractionError, PipelineError};
use crate::models::{
    Chunk, DocumentStatus, IngestReport, IngestStage, PipelineConfig, ProgressTracker,
};
use crate::services::{EmbeddingProvider, SourceFetcher, TextChunker, VectorIndex, extract_pages};
use crate::store::DocumentStore;

/// One unit of work: ingest this document from this source location.
///
/// Delivery is at-least-once; the same task may arrive more than once.
#[derive(Debug, Clone)]
pub struct IngestTask {
    pub document_id: Uuid,
    pub source_url: String,
    /// Caller-supplied payload keys, unioned with the pipeline's own.
    pub metadata: HashMap<String, String>,
}

impl IngestTask {
    pub fn new(document_id: Uuid, source_url: impl Into<String>) -> Self {
        Self {
            document_id,
            source_url: source_url.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Orchestrates one document at a time over injected collaborators.
///
/// All collaborators are pools/clients safe to share across concurrent
/// runs; the pipeline itself holds no per-document state.
pub struct IngestPipeline {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    fetcher: Arc<dyn SourceFetcher>,
    chunker: TextChunker,
    progress: ProgressTracker,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        fetcher: Arc<dyn SourceFetcher>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            fetcher,
            chunker: TextChunker::new(config),
            progress: ProgressTracker::new(),
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Run the full pipeline for one document.
    pub async fn run(&self, task: &IngestTask) -> Result<IngestReport, PipelineError> {
        let document_id = task.document_id;
        let mut vectors_touched = false;

        match self.run_stages(task, &mut vectors_touched).await {
            Ok(report) => {
                info!(
                    document_id = %document_id,
                    chunks = report.chunks_created,
                    "document processed"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(document_id = %document_id, error = %err, "pipeline run failed");

                // Partially-written points must not stay attributed to a
                // failed document; the relational rows are overwritten by
                // the next attempt instead.
                if vectors_touched {
                    if let Err(e) = self.index.delete_by_document(document_id).await {
                        warn!(document_id = %document_id, error = %e, "compensating vector delete failed");
                    }
                }

                self.mark_failed_best_effort(document_id, &err.to_string())
                    .await;
                Err(err)
            }
        }
    }

    /// Terminal handling for a run aborted from outside (time limits).
    ///
    /// The interrupted run future is dropped mid-stage and cannot
    /// compensate for itself, so any points it may have written are
    /// deleted here before the terminal status write.
    pub(crate) async fn abort_best_effort(&self, document_id: Uuid, cause: &str) {
        if let Err(e) = self.index.delete_by_document(document_id).await {
            warn!(document_id = %document_id, error = %e, "compensating vector delete failed");
        }
        self.mark_failed_best_effort(document_id, cause).await;
    }

    /// One best-effort `failed` write. Never retried, never escalated;
    /// if it fails the document stays observably `processing`.
    pub(crate) async fn mark_failed_best_effort(&self, document_id: Uuid, cause: &str) {
        self.progress.mark_failed(document_id, cause);
        if let Err(e) = self
            .store
            .update_status(document_id, DocumentStatus::Failed)
            .await
        {
            warn!(
                document_id = %document_id,
                error = %e,
                "could not write failed status; document remains processing"
            );
        }
    }

    async fn run_stages(
        &self,
        task: &IngestTask,
        vectors_touched: &mut bool,
    ) -> Result<IngestReport, PipelineError> {
        let document_id = task.document_id;

        self.progress.update(document_id, IngestStage::Fetching);
        self.store
            .update_status(document_id, DocumentStatus::Processing)
            .await?;

        let bytes = self.fetcher.fetch(&task.source_url).await?;
        let checksum = hex::encode(Sha256::digest(&bytes));
        debug!(document_id = %document_id, bytes = bytes.len(), %checksum, "fetched source");

        let class_id = self.store.read_class_id(document_id).await?;

        self.progress.update(document_id, IngestStage::Extracting);
        let pages = tokio::task::spawn_blocking(move || extract_pages(&bytes))
            .await
            .map_err(|e| {
                PipelineError::Extraction(ExtractionError::Unparseable(e.to_string()))
            })??;

        if pages.iter().all(|p| p.text.trim().is_empty()) {
            return Err(ExtractionError::NoTextContent.into());
        }

        self.progress.update(document_id, IngestStage::Chunking);
        // Chunk indices run sequentially across all pages, in page order
        let mut chunks = Vec::new();
        for page in &pages {
            for content in self.chunker.chunk(&page.text) {
                let mut metadata = task.metadata.clone();
                metadata.insert("class_id".to_string(), class_id.to_string());
                metadata.insert("checksum".to_string(), checksum.clone());
                chunks.push(Chunk {
                    document_id,
                    chunk_index: chunks.len() as u32,
                    content,
                    page_number: page.number,
                    metadata,
                });
            }
        }
        debug!(document_id = %document_id, chunks = chunks.len(), pages = pages.len(), "chunked");

        self.progress.update(document_id, IngestStage::Embedding);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        self.check_dimensions(&texts, &vectors)?;

        self.progress.update(document_id, IngestStage::Persisting);
        self.store.upsert_chunks(&chunks).await?;

        self.index.ensure_collection().await?;
        *vectors_touched = true;
        self.index.upsert(&chunks, vectors).await?;

        self.progress.update(document_id, IngestStage::Finalizing);
        self.store
            .update_status(document_id, DocumentStatus::Processed)
            .await?;

        self.progress.update(document_id, IngestStage::Complete);
        Ok(IngestReport {
            document_id,
            chunks_created: chunks.len(),
            pages: pages.len(),
            completed_at: chrono::Utc::now(),
        })
    }

    /// A vector of the wrong width is a configuration error the
    /// orchestrator surfaces, never masks.
    fn check_dimensions(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), PipelineError> {
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }
        let expected = self.embedder.dimension();
        for vector in vectors {
            if vector.len() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                }
                .into());
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MemoryIndex, MemoryStore, StaticFetcher, StubEmbedder};
    use super::*;
    use crate::error::FetchError;
    use crate::services::build_pdf;

    const DIM: usize = 8;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        index: Arc<MemoryIndex>,
        embedder: Arc<StubEmbedder>,
        pipeline: IngestPipeline,
    }

    fn fixture_with(
        bytes: Vec<u8>,
        embedder: StubEmbedder,
        index: MemoryIndex,
        store: MemoryStore,
    ) -> Fixture {
        let store = Arc::new(store);
        let index = Arc::new(index);
        let embedder = Arc::new(embedder);
        let pipeline = IngestPipeline::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
            Arc::new(StaticFetcher::new(bytes)),
            &PipelineConfig::default(),
        );
        Fixture {
            store,
            index,
            embedder,
            pipeline,
        }
    }

    fn fixture(bytes: Vec<u8>) -> Fixture {
        fixture_with(
            bytes,
            StubEmbedder::new(DIM),
            MemoryIndex::default(),
            MemoryStore::default(),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_two_page_document() {
        let page1 = words(50);
        let page2 = words(300);
        let fx = fixture(build_pdf(&[&page1, &page2]));
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        let report = fx.pipeline.run(&task).await.unwrap();

        // Page 1 is a single chunk, page 2 overlaps into two
        assert_eq!(report.chunks_created, 3);
        assert_eq!(report.pages, 2);

        let chunks = fx.store.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 3);
        let mut rows: Vec<&Chunk> = chunks.values().collect();
        rows.sort_by_key(|c| c.chunk_index);
        let indices: Vec<u32> = rows.iter().map(|c| c.chunk_index).collect();
        let pages: Vec<u32> = rows.iter().map(|c| c.page_number).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(pages, vec![1, 2, 2]);
        assert!(rows.iter().all(|c| c.metadata.contains_key("class_id")));

        // Chunk rows, vector points, and the report agree
        let points = fx.index.points.lock().unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.values().all(|doc| *doc == task.document_id));

        let statuses = fx.store.statuses.lock().unwrap();
        assert_eq!(
            *statuses,
            vec![DocumentStatus::Processing, DocumentStatus::Processed]
        );

        let progress = fx.pipeline.progress().snapshot(task.document_id).unwrap();
        assert_eq!(progress.current, 100);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_no_partial_state() {
        let fx = fixture_with(
            build_pdf(&[&words(30), &words(40), &words(25)]),
            StubEmbedder::failing_first(DIM, u32::MAX),
            MemoryIndex::default(),
            MemoryStore::default(),
        );
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        let err = fx.pipeline.run(&task).await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(_)));

        assert!(fx.store.chunks.lock().unwrap().is_empty());
        assert!(fx.index.points.lock().unwrap().is_empty());
        assert_eq!(
            fx.store.statuses.lock().unwrap().last(),
            Some(&DocumentStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_vector_failure_triggers_compensating_delete() {
        let index = MemoryIndex::default();
        index
            .fail_upserts
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let fx = fixture_with(
            build_pdf(&[&words(50)]),
            StubEmbedder::new(DIM),
            index,
            MemoryStore::default(),
        );
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        let err = fx.pipeline.run(&task).await.unwrap_err();
        assert!(matches!(err, PipelineError::VectorStore(_)));

        // Chunk rows survive (overwritten next attempt), points do not
        assert_eq!(fx.store.chunks.lock().unwrap().len(), 1);
        assert_eq!(*fx.index.deletes.lock().unwrap(), vec![task.document_id]);
        assert_eq!(
            fx.store.statuses.lock().unwrap().last(),
            Some(&DocumentStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_redelivery_overwrites_instead_of_duplicating() {
        let fx = fixture(build_pdf(&[&words(50), &words(300)]));
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        fx.pipeline.run(&task).await.unwrap();
        fx.pipeline.run(&task).await.unwrap();

        assert_eq!(fx.store.chunks.lock().unwrap().len(), 3);
        assert_eq!(fx.index.points.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_all_blank_document_fails() {
        let fx = fixture(build_pdf(&["", "   "]));
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        let err = fx.pipeline.run(&task).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extraction(ExtractionError::NoTextContent)
        ));
        assert_eq!(fx.embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparseable_source_fails() {
        let fx = fixture(b"not a pdf at all".to_vec());
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        let err = fx.pipeline.run(&task).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_the_run() {
        let mut fetcher = StaticFetcher::new(Vec::new());
        fetcher.fail = true;
        let store = Arc::new(MemoryStore::default());
        let pipeline = IngestPipeline::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::new(MemoryIndex::default()),
            Arc::new(StubEmbedder::new(DIM)),
            Arc::new(fetcher),
            &PipelineConfig::default(),
        );
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        let err = pipeline.run(&task).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Fetch(FetchError::HttpStatus { status: 404, .. })
        ));
        assert_eq!(
            store.statuses.lock().unwrap().last(),
            Some(&DocumentStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_surfaced() {
        let fx = fixture_with(
            build_pdf(&[&words(40)]),
            StubEmbedder::with_emitted_width(DIM, DIM + 1),
            MemoryIndex::default(),
            MemoryStore::default(),
        );
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        let err = fx.pipeline.run(&task).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Embedding(EmbeddingError::DimensionMismatch { .. })
        ));
        // Nothing was persisted past the embed stage
        assert!(fx.store.chunks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_write_is_best_effort() {
        let store = MemoryStore::default();
        store
            .fail_status_writes
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let fx = fixture_with(
            build_pdf(&[&words(40)]),
            StubEmbedder::new(DIM),
            MemoryIndex::default(),
            store,
        );
        let task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");

        // The original persistence error is re-raised, not the one from
        // the failed-status write
        let err = fx.pipeline.run(&task).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(fx.store.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_caller_metadata_reaches_chunk_payload() {
        let fx = fixture(build_pdf(&[&words(20)]));
        let mut task = IngestTask::new(Uuid::new_v4(), "http://blob/doc.pdf");
        task.metadata
            .insert("uploaded_by".to_string(), "instructor".to_string());

        fx.pipeline.run(&task).await.unwrap();

        let chunks = fx.store.chunks.lock().unwrap();
        let chunk = chunks.values().next().unwrap();
        assert_eq!(chunk.metadata.get("uploaded_by").unwrap(), "instructor");
        assert!(chunk.metadata.contains_key("class_id"));
        assert!(chunk.metadata.contains_key("checksum"));
    }
}
