//! End-to-end pipeline tests over the real SQLite store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lorebase_core::{
    ChunkSettings, ContentType, Document, EmbeddingStatus, Error, MemoryDocumentStore, Result,
};
use lorebase_embed::{EmbeddingBackend, FixtureEmbedder};
use lorebase_extract::TextExtractor;
use lorebase_ingest::IngestionPipeline;
use lorebase_store::{EmbeddingRecord, MetadataFilter, QueryMatch, SqliteVectorStore, VectorIndex};

struct StubExtractor {
    text: Option<String>,
}

impl StubExtractor {
    fn returning(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl TextExtractor for StubExtractor {
    async fn extract(&self, document: &Document) -> Result<String> {
        self.text
            .clone()
            .ok_or_else(|| Error::extraction(document.id, "stubbed failure"))
    }
}

struct CountingEmbedder {
    inner: FixtureEmbedder,
    calls: AtomicUsize,
    /// Zero-based call number from which `embed` starts failing.
    fail_from: Option<usize>,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            inner: FixtureEmbedder::new(8),
            calls: AtomicUsize::new(0),
            fail_from: None,
        }
    }

    fn failing() -> Self {
        Self {
            fail_from: Some(0),
            ..Self::new()
        }
    }

    fn failing_from(call: usize) -> Self {
        Self {
            fail_from: Some(call),
            ..Self::new()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for CountingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_from.is_some_and(|from| call >= from) {
            return Err(Error::Embedding("stubbed provider outage".to_string()));
        }
        self.inner.embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Delegating index that records the order of write operations.
struct RecordingIndex {
    inner: SqliteVectorStore,
    ops: Mutex<Vec<&'static str>>,
}

impl RecordingIndex {
    fn new(inner: SqliteVectorStore) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
        }
    }

    fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<()> {
        self.ops.lock().unwrap().push("upsert");
        self.inner.upsert(records).await
    }

    async fn delete_by_document(&self, doc_id: i64) -> Result<usize> {
        self.ops.lock().unwrap().push("delete");
        self.inner.delete_by_document(doc_id).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        self.inner.query(vector, top_k, filter).await
    }

    async fn count_for_document(&self, doc_id: i64) -> Result<usize> {
        self.inner.count_for_document(doc_id).await
    }
}

fn text_doc(id: i64, title: &str) -> Document {
    Document {
        id,
        title: title.to_string(),
        description: None,
        content_type: ContentType::Text,
        source: format!("storage/documents/{}.txt", id),
        original_filename: None,
        document_type: "knowledge_base".to_string(),
        is_embedded: false,
        embedding_status: EmbeddingStatus::Pending,
        last_refreshed: None,
    }
}

struct Harness {
    pipeline: IngestionPipeline,
    documents: Arc<MemoryDocumentStore>,
    embedder: Arc<CountingEmbedder>,
    index: Arc<RecordingIndex>,
    _dir: tempfile::TempDir,
}

fn harness(extractor: StubExtractor, embedder: CountingEmbedder) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let documents = Arc::new(MemoryDocumentStore::new());
    let embedder = Arc::new(embedder);
    let index = Arc::new(RecordingIndex::new(
        SqliteVectorStore::open(dir.path()).unwrap(),
    ));
    let pipeline = IngestionPipeline::new(
        documents.clone(),
        Arc::new(extractor),
        embedder.clone(),
        index.clone(),
        ChunkSettings::default(),
    );
    Harness {
        pipeline,
        documents,
        embedder,
        index,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_text_document_end_to_end() {
    let h = harness(
        StubExtractor::returning("Aria is a traveling bard from the northern reaches."),
        CountingEmbedder::new(),
    );
    h.documents.insert(text_doc(1, "Aria"));

    let report = h.pipeline.ingest(1, false).await.unwrap();
    assert_eq!(report.chunk_count, 1);
    assert_eq!(h.embedder.call_count(), 1);
    assert_eq!(h.index.count_for_document(1).await.unwrap(), 1);

    let doc = h.documents.snapshot(1).unwrap();
    assert!(doc.is_embedded);
    assert_eq!(doc.embedding_status, EmbeddingStatus::Embedded);
}

#[tokio::test]
async fn test_long_document_multiple_chunks() {
    let text = "The kingdom endured for a thousand years. ".repeat(100);
    let h = harness(StubExtractor::returning(&text), CountingEmbedder::new());
    h.documents.insert(text_doc(2, "Kingdom"));

    let report = h.pipeline.ingest(2, false).await.unwrap();
    assert!(report.chunk_count > 1);
    assert_eq!(
        h.index.count_for_document(2).await.unwrap(),
        report.chunk_count
    );

    // Chunk titles carry part numbers; check through a query hit.
    let vector = h
        .embedder
        .embed(&["anything".to_string()])
        .await
        .unwrap()
        .remove(0);
    let hits = h.index.query(&vector, 1, None).await.unwrap();
    let title = hits[0].metadata["title"].as_str().unwrap();
    assert!(title.starts_with("Kingdom - Part "));
    assert_eq!(hits[0].metadata["document_title"], "Kingdom");
}

#[tokio::test]
async fn test_reembed_deletes_before_writing() {
    let h = harness(
        StubExtractor::returning("Stable lore entry."),
        CountingEmbedder::new(),
    );
    h.documents.insert(text_doc(3, "Lore"));

    h.pipeline.ingest(3, false).await.unwrap();
    h.pipeline.ingest(3, true).await.unwrap();

    assert_eq!(h.index.ops(), vec!["upsert", "delete", "upsert"]);
    assert_eq!(h.index.count_for_document(3).await.unwrap(), 1);
    let doc = h.documents.snapshot(3).unwrap();
    assert_eq!(doc.embedding_status, EmbeddingStatus::Embedded);
}

#[tokio::test]
async fn test_reembed_of_unembedded_document_skips_delete() {
    let h = harness(
        StubExtractor::returning("Fresh entry."),
        CountingEmbedder::new(),
    );
    h.documents.insert(text_doc(4, "Fresh"));

    h.pipeline.ingest(4, true).await.unwrap();
    assert_eq!(h.index.ops(), vec!["upsert"]);
}

#[tokio::test]
async fn test_embed_failure_marks_failed_and_writes_nothing() {
    let h = harness(
        StubExtractor::returning("Some text that never gets stored."),
        CountingEmbedder::failing(),
    );
    h.documents.insert(text_doc(5, "Doomed"));

    let result = h.pipeline.ingest(5, false).await;
    assert!(matches!(result, Err(Error::Embedding(_))));
    assert_eq!(h.index.count_for_document(5).await.unwrap(), 0);

    let doc = h.documents.snapshot(5).unwrap();
    assert!(!doc.is_embedded);
    assert_eq!(doc.embedding_status, EmbeddingStatus::Failed);
}

#[tokio::test]
async fn test_reembed_failure_leaves_no_mixed_records() {
    let text = "The kingdom endured for a thousand years. ".repeat(100);
    let h = harness(
        StubExtractor::returning(&text),
        CountingEmbedder::failing_from(1),
    );
    h.documents.insert(text_doc(9, "Kingdom"));

    let report = h.pipeline.ingest(9, false).await.unwrap();
    assert!(report.chunk_count > 1);

    let result = h.pipeline.ingest(9, true).await;
    assert!(matches!(result, Err(Error::Embedding(_))));

    // The old set was cleared up front and nothing new was written; readers
    // never see a mix of generations.
    assert_eq!(h.index.ops(), vec!["upsert", "delete"]);
    assert_eq!(h.index.count_for_document(9).await.unwrap(), 0);

    let doc = h.documents.snapshot(9).unwrap();
    assert!(!doc.is_embedded);
    assert_eq!(doc.embedding_status, EmbeddingStatus::Failed);
}

#[tokio::test]
async fn test_extract_failure_marks_failed() {
    let h = harness(StubExtractor::failing(), CountingEmbedder::new());
    h.documents.insert(text_doc(6, "Unreadable"));

    let result = h.pipeline.ingest(6, false).await;
    assert!(matches!(result, Err(Error::Extraction { .. })));
    assert_eq!(
        h.documents.snapshot(6).unwrap().embedding_status,
        EmbeddingStatus::Failed
    );
    assert_eq!(h.embedder.call_count(), 0);
}

#[tokio::test]
async fn test_empty_extraction_marks_failed() {
    let h = harness(StubExtractor::returning("   \n  "), CountingEmbedder::new());
    h.documents.insert(text_doc(7, "Blank"));

    let result = h.pipeline.ingest(7, false).await;
    assert!(matches!(result, Err(Error::Extraction { .. })));
    assert_eq!(
        h.documents.snapshot(7).unwrap().embedding_status,
        EmbeddingStatus::Failed
    );
}

#[tokio::test]
async fn test_unknown_document_is_not_found() {
    let h = harness(
        StubExtractor::returning("irrelevant"),
        CountingEmbedder::new(),
    );
    let result = h.pipeline.ingest(99, false).await;
    assert!(matches!(result, Err(Error::NotFound(99))));
}

#[tokio::test]
async fn test_link_document_metadata_includes_url() {
    let h = harness(
        StubExtractor::returning("Rendered page text."),
        CountingEmbedder::new(),
    );
    let mut doc = text_doc(8, "Wiki");
    doc.content_type = ContentType::Link;
    doc.source = "https://example.com/wiki".to_string();
    h.documents.insert(doc);

    h.pipeline.ingest(8, false).await.unwrap();

    let vector = h
        .embedder
        .embed(&["Rendered page text.".to_string()])
        .await
        .unwrap()
        .remove(0);
    let hits = h.index.query(&vector, 1, None).await.unwrap();
    assert_eq!(hits[0].metadata["url"], "https://example.com/wiki");
    assert_eq!(hits[0].metadata["doc_id"], 8);
    assert_eq!(hits[0].metadata["chunk_index"], 0);
}
