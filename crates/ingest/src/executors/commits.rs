//! Commit enrichment executor.
//!
//! One commit per invocation: fetch a bounded diff, summarize with a
//! bounded retry loop, record the terminal per-unit state. Invoked
//! fire-and-forget by the wave dispatcher, so failures are logged and
//! recorded, never propagated to a caller that no longer exists.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use aufnahme_core::{JobId, UnitKey, UnitKind, UnitStatus, UnitWrite};
use aufnahme_llm::summarizer::truncate_utf8;
use aufnahme_llm::Summarizer;
use aufnahme_store::{StoreError, UnitStore};

use crate::sourcehost::{CommitInfo, RepoRef, SourceHost};

/// Sentinel written when enrichment gives up. Matches the usability gate's
/// failure signatures, so the unit stays in the retry set.
const COMMIT_FALLBACK_SUMMARY: &str = "Failed to summarize commit.";

/// Enriches the commits of one repository-ingestion job.
pub struct CommitEnricher {
    job_id: JobId,
    repo: RepoRef,
    host: Arc<dyn SourceHost>,
    summarizer: Arc<Summarizer>,
    units: Arc<dyn UnitStore>,
    retry_attempts: u32,
    retry_delay: Duration,
    max_diff_bytes: usize,
}

impl CommitEnricher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: JobId,
        repo: RepoRef,
        host: Arc<dyn SourceHost>,
        summarizer: Arc<Summarizer>,
        units: Arc<dyn UnitStore>,
        retry_attempts: u32,
        retry_delay: Duration,
        max_diff_bytes: usize,
    ) -> Self {
        Self {
            job_id,
            repo,
            host,
            summarizer,
            units,
            retry_attempts,
            retry_delay,
            max_diff_bytes,
        }
    }

    fn metadata(commit: &CommitInfo) -> serde_json::Value {
        json!({
            "message": commit.message,
            "author_name": commit.author_name,
            "author_avatar_url": commit.author_avatar_url,
            "date": commit.date,
        })
    }

    /// Enrich one commit, returning its terminal per-unit status.
    /// `Failed` here is a valid terminal state for the unit — it never
    /// fails the job.
    pub async fn enrich(&self, commit: &CommitInfo) -> Result<UnitStatus, StoreError> {
        let key = UnitKey::new(self.job_id, &commit.hash);

        self.units
            .upsert_unit(
                &key,
                UnitKind::Commit,
                &UnitWrite {
                    status: Some(UnitStatus::Processing),
                    payload: Some(Self::metadata(commit)),
                    ..Default::default()
                },
            )
            .await?;

        let diff = match self.host.diff(&self.repo, &commit.hash).await {
            Ok(diff) => diff,
            Err(e) => {
                warn!(commit = %commit.hash, error = %e, "diff fetch failed");
                self.units
                    .upsert_unit(
                        &key,
                        UnitKind::Commit,
                        &UnitWrite {
                            status: Some(UnitStatus::Failed),
                            summary: Some(COMMIT_FALLBACK_SUMMARY.into()),
                            error: Some(format!("diff fetch failed: {e}")),
                            ..Default::default()
                        },
                    )
                    .await?;
                return Ok(UnitStatus::Failed);
            }
        };
        let diff = truncate_utf8(&diff, self.max_diff_bytes);

        match self
            .summarizer
            .summarize_commit(&commit.message, diff, self.retry_attempts, self.retry_delay)
            .await
        {
            Ok(summary) => {
                self.units
                    .upsert_unit(&key, UnitKind::Commit, &UnitWrite::completed(summary))
                    .await?;
                info!(commit = %commit.hash, "commit enriched");
                Ok(UnitStatus::Completed)
            }
            Err(e) => {
                warn!(commit = %commit.hash, error = %e, "commit summarization exhausted");
                self.units
                    .upsert_unit(
                        &key,
                        UnitKind::Commit,
                        &UnitWrite {
                            status: Some(UnitStatus::Failed),
                            summary: Some(COMMIT_FALLBACK_SUMMARY.into()),
                            error: Some(e.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(UnitStatus::Failed)
            }
        }
    }

    /// Variant for fire-and-forget contexts: a persistence failure has no
    /// caller to propagate to, so it is logged at error level instead.
    pub async fn enrich_detached(&self, commit: CommitInfo) {
        if let Err(e) = self.enrich(&commit).await {
            error!(commit = %commit.hash, error = %e, "commit enrichment lost to store failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    use aufnahme_core::config::LlmConfig;
    use aufnahme_core::{JobDescriptor, JobKind};
    use aufnahme_llm::{ApiRateLimiter, LlmError, LlmProvider, SummaryRequest};
    use aufnahme_store::{JobStore, MemoryLedger};

    use crate::sourcehost::{RepoFile, SourceHostError};

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(&self, _request: &SummaryRequest) -> Result<String, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("A default commit summary that passes the gate.".into()))
        }
    }

    struct StaticHost {
        diff: Result<String, ()>,
    }

    #[async_trait]
    impl SourceHost for StaticHost {
        async fn list_files(&self, _repo: &RepoRef) -> Result<Vec<RepoFile>, SourceHostError> {
            Ok(Vec::new())
        }

        async fn fetch_file(
            &self,
            _repo: &RepoRef,
            path: &str,
        ) -> Result<String, SourceHostError> {
            Err(SourceHostError::Parse(format!("no such file {path}")))
        }

        async fn recent_commits(
            &self,
            _repo: &RepoRef,
            _limit: u32,
        ) -> Result<Vec<CommitInfo>, SourceHostError> {
            Ok(Vec::new())
        }

        async fn diff(&self, _repo: &RepoRef, _hash: &str) -> Result<String, SourceHostError> {
            self.diff
                .clone()
                .map_err(|_| SourceHostError::Api {
                    status: 502,
                    body: "bad gateway".into(),
                })
        }
    }

    fn commit() -> CommitInfo {
        CommitInfo {
            hash: "abc123".into(),
            message: "fix: clamp retry counter".into(),
            author_name: "Dev".into(),
            author_avatar_url: None,
            date: Utc::now(),
        }
    }

    async fn seeded_job(ledger: &Arc<MemoryLedger>) -> JobId {
        let descriptor = JobDescriptor {
            job_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            kind: JobKind::RepositoryIngestion,
            source_url: "https://github.com/acme/widgets".into(),
            access_token: None,
            unit_count_estimate: 1,
        };
        ledger.create_job(&descriptor).await.unwrap();
        descriptor.job_id
    }

    fn enricher(
        ledger: Arc<MemoryLedger>,
        job_id: JobId,
        diff: Result<String, ()>,
        responses: Vec<Result<String, LlmError>>,
    ) -> CommitEnricher {
        let config = LlmConfig {
            provider: "gemini".into(),
            gemini_api_key: Some("test".into()),
            gemini_model: "gemini-2.0-flash".into(),
            ollama_url: "http://localhost:11434".into(),
            ollama_model: "llama3.2".into(),
            temperature: 0.2,
            max_tokens: 256,
            max_input_bytes: 10_000,
        };
        let summarizer = Arc::new(Summarizer::new(
            Arc::new(ScriptedProvider {
                responses: Mutex::new(responses.into()),
            }),
            Arc::new(ApiRateLimiter::new(10_000)),
            &config,
        ));
        CommitEnricher::new(
            job_id,
            RepoRef {
                owner: "acme".into(),
                name: "widgets".into(),
            },
            Arc::new(StaticHost { diff }),
            summarizer,
            ledger,
            3,
            Duration::ZERO,
            10_000,
        )
    }

    #[tokio::test]
    async fn low_quality_then_success_is_accepted() {
        let ledger = Arc::new(MemoryLedger::new());
        let job_id = seeded_job(&ledger).await;
        let e = enricher(
            ledger.clone(),
            job_id,
            Ok("diff --git a/x b/x".into()),
            vec![
                Ok("".into()),
                Ok("Clamps the retry counter so exhausted units stop looping.".into()),
            ],
        );

        let status = e.enrich(&commit()).await.unwrap();
        assert_eq!(status, UnitStatus::Completed);

        let units = ledger.list_units(job_id).await.unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].summary.as_deref().unwrap().starts_with("Clamps"));
        // Commit metadata captured on first write survives the final upsert.
        let payload = units[0].payload.as_ref().unwrap();
        assert_eq!(payload["author_name"], "Dev");
    }

    #[tokio::test]
    async fn retry_exhaustion_records_failed_unit_with_sentinel() {
        let ledger = Arc::new(MemoryLedger::new());
        let job_id = seeded_job(&ledger).await;
        let e = enricher(
            ledger.clone(),
            job_id,
            Ok("diff".into()),
            vec![Ok("".into()), Ok("short".into()), Ok("".into())],
        );

        let status = e.enrich(&commit()).await.unwrap();
        assert_eq!(status, UnitStatus::Failed);

        let units = ledger.list_units(job_id).await.unwrap();
        assert_eq!(units[0].status, UnitStatus::Failed);
        assert_eq!(units[0].summary.as_deref(), Some(COMMIT_FALLBACK_SUMMARY));
        assert!(units[0].error.is_some());

        // The sentinel keeps the unit out of the processed set.
        assert!(ledger.find_processed(job_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn diff_fetch_failure_is_unit_terminal_not_fatal() {
        let ledger = Arc::new(MemoryLedger::new());
        let job_id = seeded_job(&ledger).await;
        let e = enricher(ledger.clone(), job_id, Err(()), vec![]);

        let status = e.enrich(&commit()).await.unwrap();
        assert_eq!(status, UnitStatus::Failed);

        let units = ledger.list_units(job_id).await.unwrap();
        assert!(units[0].error.as_deref().unwrap().contains("diff fetch failed"));
    }

    #[tokio::test]
    async fn re_enriching_same_commit_upserts_one_record() {
        let ledger = Arc::new(MemoryLedger::new());
        let job_id = seeded_job(&ledger).await;
        let e = enricher(
            ledger.clone(),
            job_id,
            Ok("diff".into()),
            vec![
                Ok("First pass summary for the retry test case.".into()),
                Ok("Second pass summary for the retry test case.".into()),
            ],
        );

        e.enrich(&commit()).await.unwrap();
        e.enrich(&commit()).await.unwrap();

        let units = ledger.list_units(job_id).await.unwrap();
        assert_eq!(units.len(), 1);
        assert!(units[0].summary.as_deref().unwrap().starts_with("Second"));
    }
}
