use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding backends (Gemini, Ollama, etc.)
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input text (in order).
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// The dimensionality of the output vectors.
    fn dimensions(&self) -> usize;
}

/// Embed a single text, falling back to the zero vector on any error.
///
/// Embedding failures are not worth a unit-level failure: the summary is
/// already persisted, and a zero vector simply keeps the record out of
/// similarity rankings until re-enriched.
pub async fn embed_or_zero(embedder: &dyn Embedder, text: &str) -> Vec<f32> {
    match embedder.embed_batch(&[text]).await {
        Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
        Ok(_) => {
            warn!("embedder returned no vectors, using zero vector");
            vec![0.0; embedder.dimensions()]
        }
        Err(e) => {
            warn!(error = %e, "embedding failed, using zero vector");
            vec![0.0; embedder.dimensions()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Api("down".into()))
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0; 4]).collect())
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn zero_vector_fallback_on_error() {
        let v = embed_or_zero(&BrokenEmbedder, "text").await;
        assert_eq!(v, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn passthrough_on_success() {
        let v = embed_or_zero(&UnitEmbedder, "text").await;
        assert_eq!(v, vec![1.0; 4]);
    }
}
