//! Lorebase Embed — turns chunk text into vectors.

pub mod client;

pub use client::RemoteEmbeddingClient;

use async_trait::async_trait;

use lorebase_core::Result;

/// Produces one embedding vector per input text, order-preserving.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed every text. Either all inputs succeed or the call fails; no
    /// partial output is returned.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the vectors this backend produces.
    fn dimension(&self) -> usize;
}

/// Deterministic offline backend for tests and local development.
///
/// Vectors depend only on the input bytes, so the same text always lands at
/// the same point and similar prefixes stay close.
pub struct FixtureEmbedder {
    dimension: usize,
}

impl FixtureEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for FixtureEmbedder {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl EmbeddingBackend for FixtureEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % self.dimension] += byte as f32;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in &mut vector {
                        *v /= norm;
                    }
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
