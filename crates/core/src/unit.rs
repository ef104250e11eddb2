use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// What kind of artifact an enrichment unit wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    File,
    Commit,
    Recording,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::File => write!(f, "file"),
            UnitKind::Commit => write!(f, "commit"),
            UnitKind::Recording => write!(f, "recording"),
        }
    }
}

impl std::str::FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(UnitKind::File),
            "commit" => Ok(UnitKind::Commit),
            "recording" => Ok(UnitKind::Recording),
            other => Err(format!("unknown unit kind '{other}'")),
        }
    }
}

/// Per-unit processing state. `Failed` here is a valid terminal state for
/// one unit and is distinct from pipeline-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Processing => "processing",
            UnitStatus::Completed => "completed",
            UnitStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UnitStatus::Pending),
            "processing" => Ok(UnitStatus::Processing),
            "completed" => Ok(UnitStatus::Completed),
            "failed" => Ok(UnitStatus::Failed),
            other => Err(format!("unknown unit status '{other}'")),
        }
    }
}

/// Natural key of a ledger record: parent job + stable unit identifier
/// (file path, commit hash, or the literal `"recording"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub job_id: JobId,
    pub unit_key: String,
}

impl UnitKey {
    pub fn new(job_id: JobId, unit_key: impl Into<String>) -> Self {
        Self {
            job_id,
            unit_key: unit_key.into(),
        }
    }
}

/// One atomic piece of work inside a job, as stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentUnit {
    pub job_id: JobId,
    pub unit_key: String,
    pub kind: UnitKind,
    pub status: UnitStatus,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
    /// Structured result payload (e.g. discussion points for a recording).
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable fields written on upsert. The natural key is never touched.
#[derive(Debug, Clone, Default)]
pub struct UnitWrite {
    pub status: Option<UnitStatus>,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl UnitWrite {
    pub fn completed(summary: impl Into<String>) -> Self {
        Self {
            status: Some(UnitStatus::Completed),
            summary: Some(summary.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(UnitStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// One chapter of a transcribed meeting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscussionPoint {
    pub start_ms: u64,
    pub end_ms: u64,
    pub gist: String,
    pub headline: String,
    pub summary: String,
}

// ── Summary usability gate ──────────────────────────────────────────

/// Minimum length for a summary to be trusted as a real result.
pub const MIN_USABLE_SUMMARY_LEN: usize = 10;

/// Sentinel prefixes written by producers when summarization gave up.
/// A summary that *starts* with one of these is a fallback, not a result.
const FAILURE_SIGNATURES: &[&str] = &[
    "Failed to summarize",
    "Failed to generate",
    "No summary available",
];

/// Whether a stored summary is a usable result.
///
/// A `Completed` status alone is not trusted: upstream retries may have
/// written a low-quality fallback. Producers set the status, and consumers
/// still apply this gate when computing the retry set.
pub fn is_usable_summary(summary: &str) -> bool {
    let trimmed = summary.trim();
    if trimmed.len() < MIN_USABLE_SUMMARY_LEN {
        return false;
    }
    !FAILURE_SIGNATURES.iter().any(|sig| trimmed.starts_with(sig))
}
