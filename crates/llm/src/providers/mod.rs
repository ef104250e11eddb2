pub mod gemini;
pub mod ollama;

use std::sync::Arc;

use aufnahme_core::config::LlmConfig;

use crate::provider::{LlmError, LlmProvider};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;

/// Build the configured summarization provider.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "gemini" => {
            let key = config
                .gemini_api_key
                .clone()
                .ok_or_else(|| LlmError::NotConfigured("GEMINI_API_KEY not set".into()))?;
            Ok(Arc::new(GeminiProvider::new(key, config.gemini_model.clone())))
        }
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            config.ollama_url.clone(),
            config.ollama_model.clone(),
        ))),
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider '{other}' — supported: gemini, ollama"
        ))),
    }
}
