//! Error types for the ingestion pipeline.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors fetching the source document bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to reach source: {0}")]
    ConnectionError(String),

    #[error("source returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("fetch request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("fetch timeout")]
    Timeout,
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::ConnectionError(_) | FetchError::Timeout => true,
            // 5xx and throttling are transient, 4xx is not
            FetchError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            FetchError::RequestError(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

/// Errors extracting page text from the document bytes.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unparseable document: {0}")]
    Unparseable(String),

    #[error("document contains no pages")]
    NoPages,

    #[error("no text content extracted from document")]
    NoTextContent,
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding provider: {0}")]
    ConnectionError(String),

    #[error("embedding provider error: {0}")]
    ProviderError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("model load error: {0}")]
    ModelError(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection and timeout errors are retryable
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // Provider errors might be transient (e.g. 503 Service Unavailable)
            EmbeddingError::ProviderError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            // Request errors depend on the underlying cause
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            // A dimension mismatch is a configuration error, never retryable
            EmbeddingError::DimensionMismatch { .. } => false,
            EmbeddingError::InvalidResponse(_) | EmbeddingError::ModelError(_) => false,
        }
    }
}

/// Errors related to the relational document/chunk store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to connect to database: {0}")]
    ConnectionError(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("query error: {0}")]
    QueryError(#[from] sqlx::Error),
}

impl Retryable for PersistenceError {
    fn is_retryable(&self) -> bool {
        match self {
            PersistenceError::ConnectionError(_) => true,
            PersistenceError::DocumentNotFound(_) => false,
            PersistenceError::QueryError(e) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to Qdrant: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("Qdrant client error: {0}")]
    ClientError(String),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection errors are always retryable
            VectorStoreError::ConnectionError(_) => true,
            // Other errors might be transient
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::DeleteError(msg)
            | VectorStoreError::ClientError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
            }
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// A failed stage of a single document run.
///
/// The worker surfaces these to its retry policy; the pipeline itself
/// only classifies and re-raises.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("run exceeded time limit after {0} seconds")]
    TimeLimit(u64),
}

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Fetch(e) => e.is_retryable(),
            // Unparseable or empty documents will not improve on retry
            PipelineError::Extraction(_) => false,
            PipelineError::Embedding(e) => e.is_retryable(),
            PipelineError::Persistence(e) => e.is_retryable(),
            PipelineError::VectorStore(e) => e.is_retryable(),
            PipelineError::TimeLimit(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_server_errors_are_retryable() {
        let err = FetchError::HttpStatus {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_retryable());

        let err = FetchError::HttpStatus {
            status: 404,
            body: String::new(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn extraction_errors_are_not_retryable() {
        let err = PipelineError::Extraction(ExtractionError::NoPages);
        assert!(!err.is_retryable());
    }

    #[test]
    fn dimension_mismatch_is_not_retryable() {
        let err = EmbeddingError::DimensionMismatch {
            expected: 1536,
            actual: 384,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn pipeline_error_delegates_to_cause() {
        let err = PipelineError::Embedding(EmbeddingError::Timeout);
        assert!(err.is_retryable());

        let err = PipelineError::VectorStore(VectorStoreError::UpsertError(
            "bad vector shape".to_string(),
        ));
        assert!(!err.is_retryable());
    }
}
