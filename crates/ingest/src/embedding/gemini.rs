use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::traits::{Embedder, EmbeddingError};

/// Embedder backed by the Gemini batchEmbedContents API.
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, model: String, dimensions: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents?key={}",
            self.model, self.api_key,
        );

        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&json!({ "requests": requests }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("{status}: {body}")));
        }

        let resp: serde_json::Value = response.json().await?;
        let embeddings = resp["embeddings"]
            .as_array()
            .ok_or_else(|| EmbeddingError::Api("missing embeddings array".into()))?;

        let mut vectors = Vec::with_capacity(embeddings.len());
        for e in embeddings {
            let values = e["values"]
                .as_array()
                .ok_or_else(|| EmbeddingError::Api("missing embedding values".into()))?;
            let vector: Vec<f32> = values
                .iter()
                .filter_map(|v| v.as_f64())
                .map(|v| v as f32)
                .collect();
            if vector.len() != self.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
            vectors.push(vector);
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
