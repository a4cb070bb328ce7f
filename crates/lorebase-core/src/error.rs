//! Error types for Lorebase.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Extraction failed for document {document_id}: {reason}")]
    Extraction { document_id: i64, reason: String },

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Document store error: {0}")]
    DocumentStore(String),

    #[error("Document not found: {0}")]
    NotFound(i64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap any component error as an extraction failure for the given document.
    pub fn extraction(document_id: i64, cause: impl std::fmt::Display) -> Self {
        Self::Extraction {
            document_id,
            reason: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
