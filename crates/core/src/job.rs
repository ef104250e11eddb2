use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
pub type JobId = Uuid;

/// Owner (account) identifier.
pub type OwnerId = Uuid;

/// What kind of onboarding run a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    RepositoryIngestion,
    MeetingTranscription,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::RepositoryIngestion => write!(f, "repository_ingestion"),
            JobKind::MeetingTranscription => write!(f, "meeting_transcription"),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repository_ingestion" => Ok(JobKind::RepositoryIngestion),
            "meeting_transcription" => Ok(JobKind::MeetingTranscription),
            other => Err(format!("unknown job kind '{other}'")),
        }
    }
}

/// Job lifecycle states.
///
/// Transitions are strictly forward. `Indexing` belongs to the repository
/// path, `Processing` to the meeting path — they occupy the same rank and
/// are mutually unreachable. `Failed` is reachable from any non-terminal
/// state; both `Completed` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initializing,
    LoadingSource,
    Indexing,
    Processing,
    Settling,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Forward rank used to enforce strictly-forward transitions.
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Initializing => 0,
            JobStatus::LoadingSource => 1,
            JobStatus::Indexing | JobStatus::Processing => 2,
            JobStatus::Settling => 3,
            JobStatus::Completed => 4,
            JobStatus::Failed => 5,
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Writing the same status twice is allowed (idempotent write), which
    /// is what makes `advance` safe to replay after a crash.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Initializing => "initializing",
            JobStatus::LoadingSource => "loading_source",
            JobStatus::Indexing => "indexing",
            JobStatus::Processing => "processing",
            JobStatus::Settling => "settling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(JobStatus::Initializing),
            "loading_source" => Ok(JobStatus::LoadingSource),
            "indexing" => Ok(JobStatus::Indexing),
            "processing" => Ok(JobStatus::Processing),
            "settling" => Ok(JobStatus::Settling),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Attempted transition violates the forward-only state machine.
#[derive(Debug, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One owner-initiated onboarding run.
///
/// Owned exclusively by the orchestrator; mutated only through status
/// transitions and progress counter bumps. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub owner_id: OwnerId,
    pub status: JobStatus,
    pub source_url: String,
    pub total_units: i32,
    pub processed_units: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input handed to the pipeline by the (out-of-scope) request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub kind: JobKind,
    pub source_url: String,
    pub access_token: Option<String>,
    pub unit_count_estimate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn forward_transitions_allowed() {
        assert!(JobStatus::Initializing.can_advance_to(JobStatus::LoadingSource));
        assert!(JobStatus::LoadingSource.can_advance_to(JobStatus::Indexing));
        assert!(JobStatus::LoadingSource.can_advance_to(JobStatus::Processing));
        assert!(JobStatus::Indexing.can_advance_to(JobStatus::Settling));
        assert!(JobStatus::Processing.can_advance_to(JobStatus::Settling));
        assert!(JobStatus::Settling.can_advance_to(JobStatus::Completed));
    }

    #[test]
    fn backward_transitions_rejected() {
        assert!(!JobStatus::Settling.can_advance_to(JobStatus::Indexing));
        assert!(!JobStatus::Indexing.can_advance_to(JobStatus::LoadingSource));
        assert!(!JobStatus::Completed.can_advance_to(JobStatus::Settling));
    }

    #[test]
    fn paths_do_not_cross() {
        // Indexing and Processing sit at the same rank; neither reaches the other.
        assert!(!JobStatus::Indexing.can_advance_to(JobStatus::Processing));
        assert!(!JobStatus::Processing.can_advance_to(JobStatus::Indexing));
    }

    #[test]
    fn failed_reachable_from_any_non_terminal() {
        for s in [
            JobStatus::Initializing,
            JobStatus::LoadingSource,
            JobStatus::Indexing,
            JobStatus::Processing,
            JobStatus::Settling,
        ] {
            assert!(s.can_advance_to(JobStatus::Failed), "{s} -> failed");
        }
    }

    #[test]
    fn terminals_are_absorbing() {
        assert!(!JobStatus::Completed.can_advance_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_advance_to(JobStatus::Completed));
        assert!(!JobStatus::Failed.can_advance_to(JobStatus::Settling));
    }

    #[test]
    fn rewriting_same_status_is_allowed() {
        // advance() must be safe to write twice with identical effect.
        assert!(JobStatus::Settling.can_advance_to(JobStatus::Settling));
        assert!(JobStatus::Completed.can_advance_to(JobStatus::Completed));
    }

    #[test]
    fn status_roundtrips_through_strings() {
        for s in [
            JobStatus::Initializing,
            JobStatus::LoadingSource,
            JobStatus::Indexing,
            JobStatus::Processing,
            JobStatus::Settling,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str(&s.to_string()).unwrap(), s);
        }
        assert!(JobStatus::from_str("bogus").is_err());
    }

    #[test]
    fn kind_roundtrips_through_strings() {
        for k in [JobKind::RepositoryIngestion, JobKind::MeetingTranscription] {
            assert_eq!(JobKind::from_str(&k.to_string()).unwrap(), k);
        }
    }
}
