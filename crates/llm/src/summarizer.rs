//! Quality-gated summarization on top of an [`LlmProvider`].
//!
//! Owns the prompt templates, caps raw input size, and for commit diffs
//! runs a bounded retry loop that inspects result quality before accepting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use aufnahme_core::config::LlmConfig;
use aufnahme_core::is_usable_summary;

use crate::provider::{LlmError, LlmProvider, SummaryRequest};
use crate::ratelimit::ApiRateLimiter;

const FILE_SYSTEM_PROMPT: &str = "You summarize source files for a code knowledge base. \
    In a short paragraph, describe what the file does, its key types and functions, \
    and how it fits into the wider project. Plain prose, no markdown.";

const COMMIT_SYSTEM_PROMPT: &str = "You summarize version-control commits for a code \
    knowledge base. Given a commit message and diff, describe in a short paragraph what \
    changed and why it matters. Plain prose, no markdown.";

/// Summarization front-end shared by the file and commit executors.
pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
    limiter: Arc<ApiRateLimiter>,
    temperature: f32,
    max_tokens: u32,
    max_input_bytes: usize,
}

impl Summarizer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        limiter: Arc<ApiRateLimiter>,
        config: &LlmConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_input_bytes: config.max_input_bytes,
        }
    }

    /// Summarize one source file. A single attempt: file-level failures are
    /// recorded per unit by the caller and must not block siblings.
    pub async fn summarize_file(&self, path: &str, content: &str) -> Result<String, LlmError> {
        let input = format!(
            "File: {path}\n\n{}",
            truncate_utf8(content, self.max_input_bytes)
        );
        self.complete(FILE_SYSTEM_PROMPT, input).await
    }

    /// Summarize one commit with a bounded retry loop: attempt, inspect
    /// quality, wait a fixed delay, retry. Only a usable summary is
    /// returned; exhaustion surfaces as [`LlmError::Exhausted`].
    pub async fn summarize_commit(
        &self,
        message: &str,
        diff: &str,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<String, LlmError> {
        let input = format!(
            "Commit message: {message}\n\nDiff:\n{}",
            truncate_utf8(diff, self.max_input_bytes)
        );

        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.complete(COMMIT_SYSTEM_PROMPT, input.clone()).await {
                Ok(summary) if is_usable_summary(&summary) => return Ok(summary),
                Ok(summary) => {
                    // Low-quality result: retryable, distinct from a hard error.
                    debug!(
                        attempt,
                        len = summary.len(),
                        "commit summary below quality gate, retrying"
                    );
                }
                Err(e) => {
                    warn!(attempt, error = %e, "commit summarization attempt failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(retry_delay).await;
            }
        }

        Err(LlmError::Exhausted { attempts })
    }

    async fn complete(&self, system: &str, input: String) -> Result<String, LlmError> {
        self.limiter.acquire().await;
        let request = SummaryRequest {
            system: system.to_string(),
            input,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        self.provider.complete(&request).await
    }
}

/// Truncate to at most `max_bytes`, respecting char boundaries.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
