//! Lorebase Core — document model, store interface, errors, configuration.

pub mod config;
pub mod document;
pub mod error;

pub use config::{
    ChunkSettings, DataPaths, EmbeddingSettings, ExtractSettings, LorebaseConfig,
    SchedulerSettings,
};
pub use document::{
    ContentType, Document, DocumentStore, EmbeddingStatus, MemoryDocumentStore,
};
pub use error::{Error, Result};
