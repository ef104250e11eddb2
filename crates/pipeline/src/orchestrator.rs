//! Job orchestration: drives one job through its ordered, named steps.
//!
//! Repository path: load-source → process-batch-N → queue-commits →
//! deduct-credits → mark-completed. Meeting path: submit-transcription →
//! await-transcription → persist-discussion-points → deduct-credits →
//! mark-completed. Every step runs through the durable sequencer, so a
//! restarted job resumes at the first unfinished step.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use aufnahme_core::config::{PipelineConfig, SourceHostConfig, TranscriptionConfig};
use aufnahme_core::{
    DiscussionPoint, Job, JobDescriptor, JobKind, JobStatus, UnitKey, UnitKind, UnitStatus,
    UnitWrite,
};
use aufnahme_ingest::embedding::Embedder;
use aufnahme_ingest::executors::{CommitEnricher, FileIndexer, MeetingTranscriber};
use aufnahme_ingest::scheduler::{dispatch_waves, plan_waves, WaveReceipt};
use aufnahme_ingest::sourcehost::{RepoRef, SourceHost};
use aufnahme_ingest::transcription::TranscriptionService;
use aufnahme_llm::Summarizer;
use aufnahme_store::{CreditStore, JobProgress, JobStore, Ledger, UnitStore};

use crate::dispatch::TokioDispatcher;
use crate::error::PipelineError;
use crate::steps::StepSequencer;

/// Checkpointed result of one file batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BatchStepSummary {
    processed: usize,
    errors: usize,
}

/// Checkpointed result of the transcription phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTranscription {
    points: Vec<DiscussionPoint>,
    fell_back: bool,
}

/// Drives jobs end to end against injected service and persistence seams.
pub struct Orchestrator<L: Ledger + 'static> {
    ledger: Arc<L>,
    host: Arc<dyn SourceHost>,
    transcription: Arc<dyn TranscriptionService>,
    summarizer: Arc<Summarizer>,
    embedder: Arc<dyn Embedder>,
    pipeline: PipelineConfig,
    source_host: SourceHostConfig,
    transcription_cfg: TranscriptionConfig,
}

impl<L: Ledger + 'static> Orchestrator<L> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<L>,
        host: Arc<dyn SourceHost>,
        transcription: Arc<dyn TranscriptionService>,
        summarizer: Arc<Summarizer>,
        embedder: Arc<dyn Embedder>,
        pipeline: PipelineConfig,
        source_host: SourceHostConfig,
        transcription_cfg: TranscriptionConfig,
    ) -> Self {
        Self {
            ledger,
            host,
            transcription,
            summarizer,
            embedder,
            pipeline,
            source_host,
            transcription_cfg,
        }
    }

    /// Register a validated job descriptor. Idempotent.
    pub async fn submit(&self, descriptor: &JobDescriptor) -> Result<Job, PipelineError> {
        Ok(self.ledger.create_job(descriptor).await?)
    }

    /// Run one job to a terminal state. An unrecoverable error marks the
    /// job `Failed` (halting the remaining steps) and is returned.
    pub async fn execute(&self, job: &Job) -> Result<(), PipelineError> {
        if job.status.is_terminal() {
            debug!(job = %job.id, status = %job.status, "job already terminal");
            return Ok(());
        }

        info!(job = %job.id, kind = %job.kind, status = %job.status, "executing job");
        let result = match job.kind {
            JobKind::RepositoryIngestion => self.run_repository(job).await,
            JobKind::MeetingTranscription => self.run_meeting(job).await,
        };

        if let Err(ref e) = result {
            error!(job = %job.id, error = %e, "job failed");
            if let Err(mark_err) = self.ledger.mark_failed(job.id, &e.to_string()).await {
                error!(job = %job.id, error = %mark_err, "could not record job failure");
            }
        }
        result
    }

    fn sequencer(&self, job: &Job) -> StepSequencer {
        StepSequencer::new(
            self.ledger.clone(),
            job.id,
            self.pipeline.step_retry_attempts,
            Duration::from_secs(self.pipeline.step_retry_delay_secs),
        )
    }

    /// Advance the status if the job is not already at or past `next`.
    /// A resumed job re-enters the pipeline with its status mid-flight;
    /// transitions it has already made are skipped, not errors.
    async fn advance_to(
        &self,
        job: &Job,
        next: JobStatus,
        progress: Option<JobProgress>,
    ) -> Result<(), PipelineError> {
        let current = self.ledger.get_job(job.id).await?.status;
        if current.can_advance_to(next) {
            self.ledger.advance(job.id, next, progress).await?;
        } else {
            debug!(job = %job.id, from = %current, to = %next, "transition already made, skipping");
        }
        Ok(())
    }

    // ── Repository path ─────────────────────────────────────────────

    async fn run_repository(&self, job: &Job) -> Result<(), PipelineError> {
        let repo = RepoRef::parse(&job.source_url)?;
        let seq = self.sequencer(job);

        self.advance_to(job, JobStatus::LoadingSource, None).await?;

        let paths: Vec<String> = {
            let host = self.host.clone();
            let repo = repo.clone();
            seq.run_step("load-source", move || {
                let host = host.clone();
                let repo = repo.clone();
                async move {
                    let files = host.list_files(&repo).await?;
                    Ok(files.into_iter().map(|f| f.path).collect())
                }
            })
            .await?
        };

        info!(job = %job.id, files = paths.len(), "source loaded");
        self.advance_to(
            job,
            JobStatus::Indexing,
            Some(JobProgress::total(paths.len() as i32)),
        )
        .await?;

        let indexer = Arc::new(FileIndexer::new(
            job.id,
            repo.clone(),
            self.host.clone(),
            self.summarizer.clone(),
            self.embedder.clone(),
            self.ledger.clone(),
            self.ledger.clone(),
            self.pipeline.batch_size,
        ));

        let batch_size = self.pipeline.batch_size.max(1);
        for (index, chunk) in paths.chunks(batch_size).enumerate() {
            let step_name = format!("process-batch-{index}");
            let step_indexer = indexer.clone();
            let chunk: Vec<String> = chunk.to_vec();
            let summary: BatchStepSummary = seq
                .run_step(&step_name, move || {
                    let indexer = step_indexer.clone();
                    let chunk = chunk.clone();
                    async move {
                        let outcome = indexer.index_files(&chunk).await?;
                        Ok(BatchStepSummary {
                            processed: outcome.processed_count,
                            errors: outcome.error_count,
                        })
                    }
                })
                .await?;
            debug!(
                job = %job.id,
                step = %step_name,
                processed = summary.processed,
                errors = summary.errors,
                "batch settled"
            );
        }

        self.advance_to(job, JobStatus::Settling, None).await?;

        let receipt: WaveReceipt = {
            let host = self.host.clone();
            let step_repo = repo.clone();
            let enricher = Arc::new(CommitEnricher::new(
                job.id,
                repo.clone(),
                self.host.clone(),
                self.summarizer.clone(),
                self.ledger.clone(),
                self.pipeline.unit_retry_attempts,
                Duration::from_secs(self.pipeline.unit_retry_delay_secs),
                self.source_host.max_diff_bytes,
            ));
            let limit = self.source_host.recent_commit_limit;
            let wave_size = self.pipeline.wave_size;
            let wave_delay = Duration::from_secs(self.pipeline.wave_delay_secs);
            let jitter = Duration::from_secs(self.pipeline.wave_jitter_max_secs);
            seq.run_step("queue-commits", move || {
                let host = host.clone();
                let repo = step_repo.clone();
                let enricher = enricher.clone();
                async move {
                    let commits = host.recent_commits(&repo, limit).await?;
                    let plan = plan_waves(commits, wave_size, wave_delay, jitter);
                    let dispatcher = TokioDispatcher::new(enricher);
                    dispatch_waves(plan, &dispatcher)
                        .await
                        .map_err(PipelineError::Dispatch)
                }
            })
            .await?
        };
        // Fire-and-forget: the job settles now; enrichment terminates on
        // its own and reports per unit through the ledger.
        info!(
            job = %job.id,
            queued = receipt.queued_count,
            waves = receipt.wave_count,
            eta_secs = receipt.estimated_seconds,
            "commit enrichment queued"
        );

        self.settle(&seq, job).await
    }

    // ── Meeting path ────────────────────────────────────────────────

    async fn run_meeting(&self, job: &Job) -> Result<(), PipelineError> {
        let seq = self.sequencer(job);

        self.advance_to(job, JobStatus::LoadingSource, None).await?;
        self.advance_to(job, JobStatus::Processing, Some(JobProgress::total(1)))
            .await?;

        let transcriber = Arc::new(MeetingTranscriber::new(
            self.transcription.clone(),
            Duration::from_secs(self.transcription_cfg.poll_interval_secs),
            self.transcription_cfg.max_poll_attempts,
        ));

        let transcript_id: Option<String> = {
            let transcriber = transcriber.clone();
            let url = job.source_url.clone();
            seq.run_step("submit-transcription", move || {
                let transcriber = transcriber.clone();
                let url = url.clone();
                async move { Ok(transcriber.submit_phase(&url).await) }
            })
            .await?
        };

        let outcome: StoredTranscription = {
            let transcriber = transcriber.clone();
            let id = transcript_id.clone();
            seq.run_step("await-transcription", move || {
                let transcriber = transcriber.clone();
                let id = id.clone();
                async move {
                    let outcome = transcriber.await_phase(id.as_deref()).await;
                    Ok(StoredTranscription {
                        points: outcome.points,
                        fell_back: outcome.fell_back,
                    })
                }
            })
            .await?
        };

        {
            let ledger = self.ledger.clone();
            let job_id = job.id;
            let stored = outcome.clone();
            let _: bool = seq
                .run_step("persist-discussion-points", move || {
                    let ledger = ledger.clone();
                    let stored = stored.clone();
                    async move {
                        let key = UnitKey::new(job_id, "recording");
                        let payload = serde_json::to_value(&stored.points)?;
                        let write = if stored.fell_back {
                            UnitWrite {
                                status: Some(UnitStatus::Failed),
                                summary: stored.points.first().map(|p| p.summary.clone()),
                                payload: Some(payload),
                                error: Some("transcription produced a fallback point".into()),
                                ..Default::default()
                            }
                        } else {
                            let headlines: Vec<String> =
                                stored.points.iter().map(|p| p.headline.clone()).collect();
                            UnitWrite {
                                status: Some(UnitStatus::Completed),
                                summary: Some(headlines.join("; ")),
                                payload: Some(payload),
                                ..Default::default()
                            }
                        };
                        ledger.upsert_unit(&key, UnitKind::Recording, &write).await?;
                        ledger.add_processed_units(job_id, 1).await?;
                        Ok(true)
                    }
                })
                .await?;
        }

        self.advance_to(job, JobStatus::Settling, None).await?;
        self.settle(&seq, job).await
    }

    // ── Settlement (shared) ─────────────────────────────────────────

    /// Deduct credits (exactly once, guarded both by the checkpoint and by
    /// the store-level debit record) and mark the job completed.
    async fn settle(&self, seq: &StepSequencer, job: &Job) -> Result<(), PipelineError> {
        let applied: bool = {
            let ledger = self.ledger.clone();
            let job_id = job.id;
            let owner = job.owner_id;
            seq.run_step("deduct-credits", move || {
                let ledger = ledger.clone();
                async move {
                    let current = ledger.get_job(job_id).await?;
                    let applied = ledger
                        .debit_once(job_id, owner, current.total_units as i64)
                        .await?;
                    Ok(applied)
                }
            })
            .await?
        };
        if applied {
            info!(job = %job.id, owner = %job.owner_id, "credits deducted");
        }

        {
            let ledger = self.ledger.clone();
            let job_id = job.id;
            let _: bool = seq
                .run_step("mark-completed", move || {
                    let ledger = ledger.clone();
                    async move {
                        let total = ledger.get_job(job_id).await?.total_units;
                        ledger
                            .advance(
                                job_id,
                                JobStatus::Completed,
                                Some(JobProgress {
                                    total_units: None,
                                    processed_units: Some(total),
                                }),
                            )
                            .await?;
                        Ok(true)
                    }
                })
                .await?;
        }

        info!(job = %job.id, "job completed");
        Ok(())
    }
}
