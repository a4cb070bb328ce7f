//! Lorebase Ingest — extract, chunk, embed, and store documents.

pub mod chunking;
pub mod pipeline;

pub use chunking::{chunk_document, chunk_text, Chunk, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use pipeline::{IngestReport, IngestionPipeline};
