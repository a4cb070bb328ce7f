//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to all Lorebase data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `storage/`).
    pub root: PathBuf,
    /// Vector database directory (`storage/vectordb/`).
    pub vectordb: PathBuf,
    /// Uploaded document files (`storage/documents/`).
    pub documents: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            vectordb: root.join("vectordb"),
            documents: root.join("documents"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.vectordb)?;
        std::fs::create_dir_all(&self.documents)?;
        Ok(())
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// Provider API key.
    pub api_key: String,
    /// Embedding model identifier.
    pub model: String,
    /// Vector dimensionality produced by the model.
    pub dimension: usize,
    /// Inputs per provider request.
    pub batch_size: usize,
    /// Pause between batches, milliseconds.
    pub batch_pause_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-large".to_string(),
            dimension: 3072,
            batch_size: 10,
            batch_pause_ms: 500,
        }
    }
}

/// Chunking settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap: 200,
        }
    }
}

/// Link-refresh scheduler settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Hours between refresh passes.
    pub refresh_interval_hours: f64,
    /// Documents per batch within a pass.
    pub batch_size: usize,
    /// Pause between batches, seconds.
    pub batch_pause_secs: u64,
    /// Only refresh documents older than this; `None` refreshes all LINK documents.
    pub max_age_hours: Option<f64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            refresh_interval_hours: 24.0,
            batch_size: 5,
            batch_pause_secs: 2,
            max_age_hours: None,
        }
    }
}

/// Link extraction settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExtractSettings {
    /// Timeout for the plain HTTP fetch fallback, seconds.
    pub http_timeout_secs: u64,
    /// Overall timeout for a headless-browser render, seconds.
    pub browser_timeout_secs: u64,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            browser_timeout_secs: 30,
        }
    }
}

/// Top-level Lorebase configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LorebaseConfig {
    pub data_paths: DataPaths,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkSettings,
    pub scheduler: SchedulerSettings,
    pub extract: ExtractSettings,
}

impl LorebaseConfig {
    /// Create configuration from environment and defaults.
    ///
    /// Reads `OPENAI_API_KEY`, `EMBEDDING_MODEL`, and
    /// `DOCUMENT_REFRESH_INTERVAL_HOURS` when present.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let data_paths = DataPaths::new(data_dir)?;

        let mut embedding = EmbeddingSettings::default();
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            embedding.api_key = key;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            embedding.model = model;
        }

        let mut scheduler = SchedulerSettings::default();
        if let Some(hours) = std::env::var("DOCUMENT_REFRESH_INTERVAL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            scheduler.refresh_interval_hours = hours;
        }

        Ok(Self {
            data_paths,
            embedding,
            chunking: ChunkSettings::default(),
            scheduler,
            extract: ExtractSettings::default(),
        })
    }
}
