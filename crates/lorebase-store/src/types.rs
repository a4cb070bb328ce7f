//! Row and query types for the vector index.

use serde::{Deserialize, Serialize};

/// A vector-store row: one embedded chunk of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Deterministic chunk id: `doc_{doc_id}_chunk_{chunk_index}`.
    pub id: String,
    /// Parent document id, duplicated out of `metadata` for indexed deletes.
    pub doc_id: i64,
    /// Embedding vector; dimensionality is fixed by the embedding model.
    pub vector: Vec<f32>,
    /// The chunk text as submitted to the embedding model.
    pub document_text: String,
    /// `{title, doc_id, chunk_index, document_title, document_type,
    /// original_filename, timestamp, url?}`.
    pub metadata: serde_json::Value,
}

/// Metadata equality predicate for scoped queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub field: String,
    pub value: serde_json::Value,
}

impl MetadataFilter {
    pub fn new(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Restrict results to a single character's documents.
    pub fn character(character_id: i64) -> Self {
        Self::new("character_id", character_id)
    }

    /// Whether a record's metadata satisfies this predicate.
    pub fn matches(&self, metadata: &serde_json::Value) -> bool {
        metadata.get(&self.field) == Some(&self.value)
    }
}

/// A ranked similarity hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub text: String,
    pub metadata: serde_json::Value,
    /// `1 - cosine distance`; 1.0 is an exact match.
    pub relevance_score: f32,
    /// 1-based, ascending distance.
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches() {
        let filter = MetadataFilter::character(7);
        assert!(filter.matches(&json!({"character_id": 7, "doc_id": 1})));
        assert!(!filter.matches(&json!({"character_id": 8})));
        assert!(!filter.matches(&json!({"doc_id": 1})));
    }
}
