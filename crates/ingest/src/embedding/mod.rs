pub mod gemini;
pub mod ollama;
pub mod traits;

use std::sync::Arc;

use aufnahme_core::config::EmbeddingConfig;

pub use gemini::GeminiEmbedder;
pub use ollama::OllamaEmbedder;
pub use traits::{embed_or_zero, Embedder, EmbeddingError};

/// Build the configured embedding provider.
pub fn build_embedder(
    config: &EmbeddingConfig,
    gemini_api_key: Option<String>,
    ollama_url: String,
) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider.as_str() {
        "gemini" => {
            let key = gemini_api_key
                .ok_or_else(|| EmbeddingError::Api("GEMINI_API_KEY not set".into()))?;
            Ok(Arc::new(GeminiEmbedder::new(
                key,
                config.gemini_model.clone(),
                config.dimensions as usize,
            )))
        }
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            ollama_url,
            config.ollama_embedding_model.clone(),
            config.dimensions as usize,
        ))),
        other => Err(EmbeddingError::Api(format!(
            "unknown embedding provider '{other}' — supported: gemini, ollama"
        ))),
    }
}
