mod chunker;
mod embedding;
mod extractor;
mod fetcher;
mod vector_store;

pub use chunker::TextChunker;
pub use embedding::{
    EmbeddingProvider, LocalEmbeddingProvider, RemoteEmbeddingProvider, create_provider,
};
pub use extractor::extract_pages;
pub use fetcher::{HttpSourceFetcher, SourceFetcher};
pub use vector_store::{QdrantVectorStore, VectorIndex};

#[cfg(test)]
pub(crate) use extractor::build_pdf;
