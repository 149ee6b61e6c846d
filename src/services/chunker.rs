//! Text chunking with word overlap.
//!
//! Chunks are overlapping windows over the whitespace-tokenized word
//! sequence of a page, so semantic context at chunk boundaries is not
//! lost. Chunking is total: it cannot abort the pipeline.

use crate::models::PipelineConfig;

/// Word-window chunker with overlap.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Window size in words.
    chunk_size: usize,
    /// Overlap between consecutive windows, in words.
    overlap: usize,
}

impl TextChunker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            // A zero-width window cannot make progress
            chunk_size: config.chunk_size.max(1),
            overlap: config.chunk_overlap,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&PipelineConfig::default())
    }

    /// Split page text into overlapping chunks.
    ///
    /// Text of at most `chunk_size` words is returned unchanged as a
    /// single chunk; empty or whitespace-only text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let n = words.len();

        if n == 0 {
            return Vec::new();
        }
        if n <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(n);
            chunks.push(words[start..end].join(" "));

            if end == n {
                break;
            }

            // The max(start + 1, ..) guard guarantees forward progress
            // even when overlap >= chunk_size.
            start = (start + 1).max(end.saturating_sub(self.overlap));
        }

        chunks
    }
}
