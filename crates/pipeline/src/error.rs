use thiserror::Error;

use aufnahme_ingest::sourcehost::SourceHostError;
use aufnahme_ingest::transcription::TranscriptionError;
use aufnahme_llm::LlmError;
use aufnahme_store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("source host error: {0}")]
    SourceHost(#[from] SourceHostError),

    #[error("summarization error: {0}")]
    Llm(#[from] LlmError),

    #[error("transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("step '{step}' failed after {attempts} attempts: {source}")]
    StepExhausted {
        step: String,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },
}
