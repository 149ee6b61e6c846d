use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document lifecycle status. `Processed` and `Failed` are terminal;
/// a new ingestion attempt restarts at `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "processed" => Ok(DocumentStatus::Processed),
            "failed" => Ok(DocumentStatus::Failed),
            _ => Err(format!("unknown document status: {}", s)),
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Pending => write!(f, "pending"),
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Processed => write!(f, "processed"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One page of extracted text. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based, strictly increasing with no gaps.
    pub number: u32,
    pub text: String,
}

/// A bounded, possibly overlapping window of a document's text.
///
/// Chunk indices are sequential across all pages of a document, not
/// reset per page. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: Uuid,
    pub chunk_index: u32,
    pub content: String,
    pub page_number: u32,
    /// Payload attributes beyond the core triplet (class_id, page_number,
    /// checksum, plus caller-supplied keys).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Deterministic vector point id for this chunk.
    ///
    /// Derived from `(document_id, chunk_index)` so a re-delivered run
    /// overwrites its own points instead of duplicating them.
    pub fn point_id(document_id: Uuid, chunk_index: u32) -> Uuid {
        let name = format!("{}:{}", document_id, chunk_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}

/// Outcome of a successful document run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: Uuid,
    pub chunks_created: usize,
    pub pages: usize,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Processed,
            DocumentStatus::Failed,
        ] {
            let parsed: DocumentStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("archived".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(DocumentStatus::Processed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
    }

    #[test]
    fn test_point_id_deterministic() {
        let doc = Uuid::new_v4();
        let id = Chunk::point_id(doc, 5);
        assert_eq!(id, Chunk::point_id(doc, 5));
        assert_ne!(id, Chunk::point_id(doc, 6));
        assert_ne!(id, Chunk::point_id(Uuid::new_v4(), 5));
    }
}
