//! Lorebase Store — persistent vector index for document chunk embeddings.

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteVectorStore;
pub use types::{EmbeddingRecord, MetadataFilter, QueryMatch};

use async_trait::async_trait;
use lorebase_core::Result;

/// Fixed collection name for document chunk embeddings.
pub const COLLECTION_NAME: &str = "documents_embeddings";

/// A persistent similarity index over embedded document chunks.
///
/// Collections are created lazily on first write, never on read.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records by id.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()>;

    /// Remove every record belonging to a document. Returns the number of
    /// records removed. Best-effort: missing collections or ids are not fatal.
    async fn delete_by_document(&self, doc_id: i64) -> Result<usize>;

    /// Top-k nearest records by cosine distance, optionally restricted by a
    /// metadata equality predicate.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>>;

    /// Number of live records for a document.
    async fn count_for_document(&self, doc_id: i64) -> Result<usize>;
}
