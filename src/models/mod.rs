mod config;
mod document;
mod progress;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_DATABASE_URL, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL, DEFAULT_QDRANT_URL, DatabaseConfig,
    EmbeddingConfig, EmbeddingProviderKind, PipelineConfig, VectorStoreConfig,
};
pub use document::{Chunk, DocumentStatus, IngestReport, Page};
pub use progress::{IngestStage, ProgressTracker, TaskProgress};
