//! Embedding provider abstraction.
//!
//! Two backends produce vectors behind the same contract: a remote
//! batch HTTP API and an in-process ONNX model. The variant is chosen
//! once per process from configuration, never per call. `embed` is
//! all-or-nothing: it never returns partial results.

mod local;
mod remote;

pub use local::LocalEmbeddingProvider;
pub use remote::RemoteEmbeddingProvider;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProviderKind};

/// Polymorphic capability `embed(texts) -> vectors`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, preserving input order and length.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Configured vector dimensionality. Must match the collection.
    fn dimension(&self) -> usize;

    /// Check that the backend is reachable and ready.
    async fn health_check(&self) -> Result<(), EmbeddingError>;

    /// Short identifier for logs and status output.
    fn name(&self) -> &'static str;
}

/// Resolve the configured backend into a provider instance.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
        EmbeddingProviderKind::Remote => {
            Ok(Arc::new(RemoteEmbeddingProvider::new(config)?))
        }
        EmbeddingProviderKind::Local => Ok(Arc::new(LocalEmbeddingProvider::load(config)?)),
    }
}
