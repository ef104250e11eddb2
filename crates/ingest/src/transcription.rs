//! Transcription service client — the submit/poll/retrieve side of the
//! meeting pipeline.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use aufnahme_core::DiscussionPoint;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} — {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("service not configured: {0}")]
    NotConfigured(String),
}

/// Remote transcript job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptStatus {
    Processing,
    Completed,
    Error(String),
}

/// Three-phase async job contract: submit is fast, status is polled, the
/// result is retrieved once status signals completion.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn submit(&self, audio_url: &str) -> Result<String, TranscriptionError>;

    async fn status(&self, transcript_id: &str) -> Result<TranscriptStatus, TranscriptionError>;

    async fn result(
        &self,
        transcript_id: &str,
    ) -> Result<Vec<DiscussionPoint>, TranscriptionError>;
}

/// HTTP backend for an AssemblyAI-style transcript API.
pub struct HttpTranscriptionService {
    client: Client,
    api_base: String,
    api_key: String,
}

impl HttpTranscriptionService {
    pub fn new(api_base: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_base,
            api_key,
        }
    }

    async fn get_transcript(
        &self,
        transcript_id: &str,
    ) -> Result<serde_json::Value, TranscriptionError> {
        let url = format!("{}/v2/transcript/{}", self.api_base, transcript_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TranscriptionService for HttpTranscriptionService {
    async fn submit(&self, audio_url: &str) -> Result<String, TranscriptionError> {
        let url = format!("{}/v2/transcript", self.api_base);
        let body = json!({
            "audio_url": audio_url,
            "auto_chapters": true,
        });

        debug!("submitting transcription for {audio_url}");

        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        resp["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| TranscriptionError::Parse("missing transcript id".into()))
    }

    async fn status(&self, transcript_id: &str) -> Result<TranscriptStatus, TranscriptionError> {
        let resp = self.get_transcript(transcript_id).await?;
        match resp["status"].as_str() {
            Some("completed") => Ok(TranscriptStatus::Completed),
            Some("error") => Ok(TranscriptStatus::Error(
                resp["error"].as_str().unwrap_or("unknown error").to_string(),
            )),
            Some(_) => Ok(TranscriptStatus::Processing),
            None => Err(TranscriptionError::Parse("missing status field".into())),
        }
    }

    async fn result(
        &self,
        transcript_id: &str,
    ) -> Result<Vec<DiscussionPoint>, TranscriptionError> {
        let resp = self.get_transcript(transcript_id).await?;
        let chapters = resp["chapters"].as_array().cloned().unwrap_or_default();

        Ok(chapters
            .iter()
            .map(|c| DiscussionPoint {
                start_ms: c["start"].as_u64().unwrap_or(0),
                end_ms: c["end"].as_u64().unwrap_or(0),
                gist: c["gist"].as_str().unwrap_or_default().to_string(),
                headline: c["headline"].as_str().unwrap_or_default().to_string(),
                summary: c["summary"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }
}
