//! Lorebase Retrieve — query-time similarity search over embedded chunks.

use std::sync::Arc;

use tracing::debug;

use lorebase_core::Result;
use lorebase_embed::EmbeddingBackend;
use lorebase_store::{MetadataFilter, QueryMatch, VectorIndex};

pub const DEFAULT_TOP_K: usize = 5;

/// Embeds a query and returns the closest stored chunks.
pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn VectorIndex>,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-k chunks for a query, ranked by relevance. `character_scope`
    /// restricts results to chunks tagged with that character id.
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
        character_scope: Option<i64>,
    ) -> Result<Vec<QueryMatch>> {
        let vectors = self.embedder.embed(&[query_text.to_string()]).await?;
        let Some(vector) = vectors.into_iter().next() else {
            return Ok(Vec::new());
        };

        let filter = character_scope.map(MetadataFilter::character);
        let matches = self.index.query(&vector, top_k, filter.as_ref()).await?;
        debug!(
            "Query returned {} of {} requested matches",
            matches.len(),
            top_k
        );
        Ok(matches)
    }
}
