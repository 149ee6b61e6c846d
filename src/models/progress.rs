//! Observational progress reporting for document runs.
//!
//! Progress never gates correctness; pollers read a point-in-time
//! snapshot of `{current, total, status_message}` per document.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use uuid::Uuid;

/// Stage boundaries of a document run, as monotone percentage checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Fetching,
    Extracting,
    Chunking,
    Embedding,
    Persisting,
    Finalizing,
    Complete,
}

impl IngestStage {
    pub fn percent(self) -> u8 {
        match self {
            IngestStage::Fetching => 0,
            IngestStage::Extracting => 10,
            IngestStage::Chunking => 30,
            IngestStage::Embedding => 50,
            IngestStage::Persisting => 70,
            IngestStage::Finalizing => 90,
            IngestStage::Complete => 100,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            IngestStage::Fetching => "Starting document processing...",
            IngestStage::Extracting => "Extracting text from PDF...",
            IngestStage::Chunking => "Chunking text...",
            IngestStage::Embedding => "Generating embeddings...",
            IngestStage::Persisting => "Storing chunks in database...",
            IngestStage::Finalizing => "Updating document status...",
            IngestStage::Complete => "Done",
        }
    }
}

/// Queryable progress blob for one document run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub current: u8,
    pub total: u8,
    pub status_message: String,
}

/// Shared registry of per-document progress, updated at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<Uuid, TaskProgress>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, document_id: Uuid, stage: IngestStage) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(
                document_id,
                TaskProgress {
                    current: stage.percent(),
                    total: 100,
                    status_message: stage.message().to_string(),
                },
            );
        }
    }

    /// Freeze the current percentage and record the failure cause.
    pub fn mark_failed(&self, document_id: Uuid, cause: &str) {
        if let Ok(mut map) = self.inner.write() {
            let current = map.get(&document_id).map_or(0, |p| p.current);
            map.insert(
                document_id,
                TaskProgress {
                    current,
                    total: 100,
                    status_message: format!("failed: {}", cause),
                },
            );
        }
    }

    /// Evict a document's entry once its delivery is over.
    ///
    /// Without this a long-lived worker pool grows the map by one entry
    /// per document ever ingested.
    pub fn forget(&self, document_id: Uuid) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&document_id);
        }
    }

    pub fn snapshot(&self, document_id: Uuid) -> Option<TaskProgress> {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(&document_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints_are_monotone() {
        let stages = [
            IngestStage::Fetching,
            IngestStage::Extracting,
            IngestStage::Chunking,
            IngestStage::Embedding,
            IngestStage::Persisting,
            IngestStage::Finalizing,
            IngestStage::Complete,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
        assert_eq!(IngestStage::Fetching.percent(), 0);
        assert_eq!(IngestStage::Complete.percent(), 100);
    }

    #[test]
    fn test_tracker_updates() {
        let tracker = ProgressTracker::new();
        let doc = Uuid::new_v4();

        assert!(tracker.snapshot(doc).is_none());

        tracker.update(doc, IngestStage::Embedding);
        let progress = tracker.snapshot(doc).unwrap();
        assert_eq!(progress.current, 50);
        assert_eq!(progress.total, 100);
        assert_eq!(progress.status_message, "Generating embeddings...");
    }

    #[test]
    fn test_forget_evicts_entry() {
        let tracker = ProgressTracker::new();
        let doc = Uuid::new_v4();

        tracker.update(doc, IngestStage::Complete);
        assert!(tracker.snapshot(doc).is_some());

        tracker.forget(doc);
        assert!(tracker.snapshot(doc).is_none());
    }

    #[test]
    fn test_mark_failed_freezes_percentage() {
        let tracker = ProgressTracker::new();
        let doc = Uuid::new_v4();

        tracker.update(doc, IngestStage::Persisting);
        tracker.mark_failed(doc, "database unreachable");

        let progress = tracker.snapshot(doc).unwrap();
        assert_eq!(progress.current, 70);
        assert!(progress.status_message.starts_with("failed:"));
    }
}
