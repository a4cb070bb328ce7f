//! Document model and the consumed `DocumentStore` interface.
//!
//! Documents are owned by the surrounding CRUD layer; the ingestion pipeline
//! only reads source fields and writes status fields. `MemoryDocumentStore`
//! is the reference implementation used by tests and embedding callers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How a document's content is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Uploaded file on disk; `source` is the file path.
    File,
    /// Inline text persisted to a file; `source` is the file path.
    Text,
    /// Remote page; `source` is the URL.
    Link,
}

/// Embedding lifecycle of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Pending,
    Processing,
    Embedded,
    Failed,
}

impl std::fmt::Display for EmbeddingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Embedded => "embedded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A source document as seen by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content_type: ContentType,
    /// File path for File/Text documents, URL for Link documents.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    /// Category label, e.g. `knowledge_base`, `reference`, `instruction`.
    pub document_type: String,
    pub is_embedded: bool,
    pub embedding_status: EmbeddingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl Document {
    /// Lowercased extension of the original filename, without the dot.
    pub fn file_extension(&self) -> Option<String> {
        let name = self.original_filename.as_deref().unwrap_or(&self.source);
        name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
    }
}

/// Interface to the external document CRUD layer.
///
/// The pipeline never creates or deletes documents through this interface.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn get(&self, id: i64) -> Result<Option<Document>>;

    /// Persist a status transition.
    async fn update_status(&self, id: i64, is_embedded: bool, status: EmbeddingStatus)
        -> Result<()>;

    /// Link documents due for a refresh: never refreshed, or last refreshed
    /// before `now - max_age_hours`. `None` returns all Link documents.
    async fn list_due_for_refresh(&self, max_age_hours: Option<f64>) -> Result<Vec<Document>>;

    /// Stamp a successful refresh.
    async fn set_last_refreshed(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

/// In-memory `DocumentStore` for tests and single-process embedding callers.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<i64, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document.
    pub fn insert(&self, document: Document) {
        self.documents.write().insert(document.id, document);
    }

    /// Snapshot of a document, for assertions.
    pub fn snapshot(&self, id: i64) -> Option<Document> {
        self.documents.read().get(&id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: i64) -> Result<Option<Document>> {
        Ok(self.documents.read().get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: i64,
        is_embedded: bool,
        status: EmbeddingStatus,
    ) -> Result<()> {
        let mut documents = self.documents.write();
        let doc = documents
            .get_mut(&id)
            .ok_or_else(|| Error::DocumentStore(format!("unknown document {}", id)))?;
        doc.is_embedded = is_embedded;
        doc.embedding_status = status;
        Ok(())
    }

    async fn list_due_for_refresh(&self, max_age_hours: Option<f64>) -> Result<Vec<Document>> {
        let cutoff = max_age_hours
            .map(|h| Utc::now() - Duration::seconds((h * 3600.0) as i64));
        let documents = self.documents.read();
        let mut due: Vec<Document> = documents
            .values()
            .filter(|d| d.content_type == ContentType::Link)
            .filter(|d| match (d.last_refreshed, cutoff) {
                (None, _) => true,
                (Some(_), None) => true,
                (Some(at), Some(cutoff)) => at < cutoff,
            })
            .cloned()
            .collect();
        due.sort_by_key(|d| d.id);
        Ok(due)
    }

    async fn set_last_refreshed(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut documents = self.documents.write();
        let doc = documents
            .get_mut(&id)
            .ok_or_else(|| Error::DocumentStore(format!("unknown document {}", id)))?;
        doc.last_refreshed = Some(at);
        Ok(())
    }
}
