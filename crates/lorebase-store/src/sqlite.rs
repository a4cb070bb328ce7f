//! SQLite-backed vector collection with brute-force cosine top-k.
//!
//! Vectors are stored as little-endian f32 blobs. Collections are rows in a
//! `collections` table and are created lazily on first write; a query against
//! a collection that was never written returns no results instead of creating
//! it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ndarray::Array1;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::types::{EmbeddingRecord, MetadataFilter, QueryMatch};
use crate::{VectorIndex, COLLECTION_NAME};
use lorebase_core::{Error, Result};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name       TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS embeddings (
    id            TEXT PRIMARY KEY,
    collection    TEXT NOT NULL,
    doc_id        INTEGER NOT NULL,
    vector        BLOB NOT NULL,
    document_text TEXT NOT NULL,
    metadata      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_collection_doc
    ON embeddings(collection, doc_id);
";

/// Persistent vector store over a single SQLite file.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    /// Open or create the store. `db_dir` is the vector database directory;
    /// the file will be `db_dir/lorebase.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::VectorStore(e.to_string()))?;
        let db_path = db_dir.join("lorebase.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::VectorStore(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let count = store.count_all()?;
        info!(
            "SqliteVectorStore opened: {} records, path={}",
            count,
            store.db_path.display()
        );
        Ok(store)
    }

    fn count_all(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        Ok(count as usize)
    }

    fn collection_exists(conn: &Connection, name: &str) -> Result<bool> {
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        Ok(exists.is_some())
    }

    fn upsert_sync(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        // Get-or-create the collection on first write.
        tx.execute(
            "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
            params![COLLECTION_NAME, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::VectorStore(e.to_string()))?;

        for record in records {
            tx.execute(
                "INSERT OR REPLACE INTO embeddings
                     (id, collection, doc_id, vector, document_text, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    COLLECTION_NAME,
                    record.doc_id,
                    vector_to_blob(&record.vector),
                    record.document_text,
                    record.metadata.to_string(),
                ],
            )
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        }

        tx.commit().map_err(|e| Error::VectorStore(e.to_string()))?;
        debug!("Upserted {} records", records.len());
        Ok(())
    }

    fn delete_sync(&self, doc_id: i64) -> Result<usize> {
        let conn = self.conn.lock();

        if !Self::collection_exists(&conn, COLLECTION_NAME)? {
            warn!(
                "Delete for document {} skipped: collection {} does not exist",
                doc_id, COLLECTION_NAME
            );
            return Ok(0);
        }

        let deleted = conn
            .execute(
                "DELETE FROM embeddings WHERE collection = ?1 AND doc_id = ?2",
                params![COLLECTION_NAME, doc_id],
            )
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        if deleted > 0 {
            info!("Deleted {} chunks for document {}", deleted, doc_id);
            return Ok(deleted);
        }

        // Legacy fallback: records written before per-chunk ids existed were
        // keyed by the document id alone.
        let legacy = conn
            .execute(
                "DELETE FROM embeddings WHERE collection = ?1 AND id = ?2",
                params![COLLECTION_NAME, format!("doc_{}", doc_id)],
            )
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        if legacy > 0 {
            info!("Deleted document {} using legacy id format", doc_id);
        } else {
            debug!("No records to delete for document {}", doc_id);
        }
        Ok(legacy)
    }

    fn query_sync(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let conn = self.conn.lock();

        // Collections are never created on read.
        if !Self::collection_exists(&conn, COLLECTION_NAME)? {
            debug!("Query against missing collection {}", COLLECTION_NAME);
            return Ok(Vec::new());
        }

        let mut stmt = conn
            .prepare(
                "SELECT vector, document_text, metadata
                 FROM embeddings WHERE collection = ?1",
            )
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let rows = stmt
            .query_map(params![COLLECTION_NAME], |row| {
                let blob: Vec<u8> = row.get(0)?;
                let text: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                Ok((blob, text, metadata))
            })
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let query = Array1::from_vec(vector.to_vec());
        let query_norm = query.dot(&query).sqrt();

        let mut scored: Vec<(f32, String, serde_json::Value)> = Vec::new();
        for row in rows {
            let (blob, text, metadata) = row.map_err(|e| Error::VectorStore(e.to_string()))?;
            let metadata: serde_json::Value = match serde_json::from_str(&metadata) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping record with unparseable metadata: {}", e);
                    continue;
                }
            };
            if let Some(f) = filter {
                if !f.matches(&metadata) {
                    continue;
                }
            }
            let candidate = Array1::from_vec(blob_to_vector(&blob));
            let distance = 1.0 - cosine_similarity(&query, query_norm, &candidate);
            scored.push((distance, text, metadata));
        }

        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, (distance, text, metadata))| QueryMatch {
                text,
                metadata,
                relevance_score: 1.0 - distance,
                rank: i + 1,
            })
            .collect())
    }

    fn count_sync(&self, doc_id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM embeddings WHERE collection = ?1 AND doc_id = ?2",
                params![COLLECTION_NAME, doc_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorStore {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()> {
        self.upsert_sync(records)
    }

    async fn delete_by_document(&self, doc_id: i64) -> Result<usize> {
        self.delete_sync(doc_id)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        self.query_sync(vector, top_k, filter)
    }

    async fn count_for_document(&self, doc_id: i64) -> Result<usize> {
        self.count_sync(doc_id)
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine_similarity(query: &Array1<f32>, query_norm: f32, candidate: &Array1<f32>) -> f32 {
    if query.len() != candidate.len() {
        return 0.0;
    }
    let candidate_norm = candidate.dot(candidate).sqrt();
    if query_norm == 0.0 || candidate_norm == 0.0 {
        return 0.0;
    }
    query.dot(candidate) / (query_norm * candidate_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, doc_id: i64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            doc_id,
            vector,
            document_text: format!("text for {}", id),
            metadata: json!({"doc_id": doc_id, "chunk_index": 0}),
        }
    }

    #[tokio::test]
    async fn test_query_missing_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path()).unwrap();
        let results = store.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_and_ranked_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path()).unwrap();

        store
            .upsert(&[
                record("doc_1_chunk_0", 1, vec![1.0, 0.0, 0.0]),
                record("doc_1_chunk_1", 1, vec![0.0, 1.0, 0.0]),
                record("doc_2_chunk_0", 2, vec![0.9, 0.1, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].text, "text for doc_1_chunk_0");
        assert!((results[0].relevance_score - 1.0).abs() < 1e-5);
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[1].text, "text for doc_2_chunk_0");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path()).unwrap();

        store
            .upsert(&[record("doc_1_chunk_0", 1, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&[record("doc_1_chunk_0", 1, vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count_for_document(1).await.unwrap(), 1);
        let results = store.query(&[0.0, 1.0], 1, None).await.unwrap();
        assert!((results[0].relevance_score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_delete_by_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path()).unwrap();

        store
            .upsert(&[
                record("doc_1_chunk_0", 1, vec![1.0, 0.0]),
                record("doc_1_chunk_1", 1, vec![0.0, 1.0]),
                record("doc_2_chunk_0", 2, vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let deleted = store.delete_by_document(1).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_for_document(1).await.unwrap(), 0);
        assert_eq!(store.count_for_document(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_legacy_id_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path()).unwrap();

        // A pre-chunking record keyed by document id alone, with a doc_id
        // column that does not match (as legacy rows had none).
        store
            .upsert(&[record("doc_7", 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        let deleted = store.delete_by_document(7).await.unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_collection_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.delete_by_document(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_metadata_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path()).unwrap();

        let mut a = record("doc_1_chunk_0", 1, vec![1.0, 0.0]);
        a.metadata = json!({"doc_id": 1, "character_id": 7});
        let mut b = record("doc_2_chunk_0", 2, vec![1.0, 0.0]);
        b.metadata = json!({"doc_id": 2, "character_id": 8});
        store.upsert(&[a, b]).await.unwrap();

        let filter = MetadataFilter::character(7);
        let results = store.query(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["character_id"], json!(7));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteVectorStore::open(dir.path()).unwrap();
            store
                .upsert(&[record("doc_1_chunk_0", 1, vec![1.0, 0.0])])
                .await
                .unwrap();
        }
        let store = SqliteVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.count_for_document(1).await.unwrap(), 1);
    }

    #[test]
    fn test_blob_roundtrip() {
        let vector = vec![0.25f32, -1.5, 3.75];
        assert_eq!(blob_to_vector(&vector_to_blob(&vector)), vector);
    }
}
