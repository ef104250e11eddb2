use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single summarization request: one system instruction, one input text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub system: String,
    pub input: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait for LLM providers — each backend implements this.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a completion request and return the response text.
    async fn complete(&self, request: &SummaryRequest) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} — {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("no usable summary after {attempts} attempts")]
    Exhausted { attempts: u32 },
}
