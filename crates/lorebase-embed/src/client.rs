//! OpenAI-compatible embeddings client.
//!
//! Inputs are sent in fixed-size batches with a pause between batches so a
//! large document does not burn through the provider's rate limit.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lorebase_core::{EmbeddingSettings, Error, Result};

use crate::EmbeddingBackend;

pub struct RemoteEmbeddingClient {
    settings: EmbeddingSettings,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl RemoteEmbeddingClient {
    pub fn new(settings: EmbeddingSettings) -> Result<Self> {
        if settings.api_key.is_empty() {
            return Err(Error::Config("embedding API key is not set".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { settings, http })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.settings.api_base.trim_end_matches('/'));
        let request = EmbeddingsRequest {
            model: &self.settings.model,
            input: batch,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("bad response body: {}", e)))?;

        if parsed.data.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }

        // The provider tags each vector with its input index; reorder so the
        // output lines up with the batch.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        for d in &data {
            if d.embedding.len() != self.settings.dimension {
                return Err(Error::Embedding(format!(
                    "expected dimension {}, got {}",
                    self.settings.dimension,
                    d.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingBackend for RemoteEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = texts.len().div_ceil(batch_size);
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(batch_size).enumerate() {
            debug!(
                "Embedding batch {}/{} ({} texts)",
                i + 1,
                batch_count,
                batch.len()
            );
            vectors.extend(self.embed_batch(batch).await?);

            if i + 1 < batch_count && self.settings.batch_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.batch_pause_ms)).await;
            }
        }

        info!(
            "Embedded {} texts with {} in {} batches",
            texts.len(),
            self.settings.model,
            batch_count
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.settings.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_rejected() {
        let settings = EmbeddingSettings::default();
        assert!(matches!(
            RemoteEmbeddingClient::new(settings),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_response_parsing_out_of_order() {
        let body = r#"{"data":[
            {"embedding":[0.0,1.0],"index":1},
            {"embedding":[1.0,0.0],"index":0}
        ]}"#;
        let mut parsed: EmbeddingsResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
        assert_eq!(parsed.data[1].embedding, vec![0.0, 1.0]);
    }
}
