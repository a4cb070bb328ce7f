//! The ingestion pipeline: extract, chunk, embed, upsert.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use lorebase_core::{
    ChunkSettings, ContentType, Document, DocumentStore, EmbeddingStatus, Error, Result,
};
use lorebase_embed::EmbeddingBackend;
use lorebase_extract::TextExtractor;
use lorebase_store::{EmbeddingRecord, VectorIndex};

use crate::chunking::{chunk_document, Chunk};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub document_id: i64,
    pub chunk_count: usize,
}

/// Drives a document from source text to stored embeddings.
///
/// Embedding is all-or-nothing per document: the vector store is only written
/// once every chunk has a vector, so a failed run never leaves a document
/// half-indexed.
pub struct IngestionPipeline {
    documents: Arc<dyn DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkSettings,
}

impl IngestionPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkSettings,
    ) -> Self {
        Self {
            documents,
            extractor,
            embedder,
            index,
            chunking,
        }
    }

    /// Ingest one document. With `reembed`, existing records for the document
    /// are removed before the new ones are written.
    pub async fn ingest(&self, document_id: i64, reembed: bool) -> Result<IngestReport> {
        let document = self
            .documents
            .get(document_id)
            .await?
            .ok_or(Error::NotFound(document_id))?;

        if reembed && document.is_embedded {
            // Stale records are cleared up front; a failure here only means
            // the old chunks linger until the upsert overwrites them.
            if let Err(e) = self.index.delete_by_document(document_id).await {
                warn!(
                    "Could not clear old embeddings for document {}: {}",
                    document_id, e
                );
            }
        }

        self.documents
            .update_status(document_id, false, EmbeddingStatus::Processing)
            .await?;

        match self.run(&document).await {
            Ok(report) => {
                self.documents
                    .update_status(document_id, true, EmbeddingStatus::Embedded)
                    .await?;
                info!(
                    "Document {} embedded as {} chunks",
                    document_id, report.chunk_count
                );
                Ok(report)
            }
            Err(e) => {
                warn!("Ingestion of document {} failed: {}", document_id, e);
                if let Err(status_err) = self
                    .documents
                    .update_status(document_id, false, EmbeddingStatus::Failed)
                    .await
                {
                    warn!(
                        "Could not mark document {} as failed: {}",
                        document_id, status_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(&self, document: &Document) -> Result<IngestReport> {
        let text = self.extractor.extract(document).await?;
        if text.trim().is_empty() {
            return Err(Error::extraction(document.id, "no text content"));
        }

        let chunks = chunk_document(
            document,
            &text,
            self.chunking.chunk_size,
            self.chunking.overlap,
        );
        if chunks.is_empty() {
            return Err(Error::Chunking(format!(
                "document {} produced no chunks",
                document.id
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| build_record(document, chunk, vector))
            .collect();
        self.index.upsert(&records).await?;

        Ok(IngestReport {
            document_id: document.id,
            chunk_count: records.len(),
        })
    }
}

fn build_record(document: &Document, chunk: &Chunk, vector: Vec<f32>) -> EmbeddingRecord {
    let mut metadata = json!({
        "title": chunk.title,
        "doc_id": document.id,
        "chunk_index": chunk.chunk_index,
        "document_title": document.title,
        "document_type": document.document_type,
        "original_filename": document.original_filename,
        "timestamp": Utc::now().to_rfc3339(),
    });
    if document.content_type == ContentType::Link {
        metadata["url"] = json!(document.source);
    }

    EmbeddingRecord {
        id: chunk.id.clone(),
        doc_id: document.id,
        vector,
        document_text: chunk.text.clone(),
        metadata,
    }
}
