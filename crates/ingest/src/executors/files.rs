//! File indexing executor.
//!
//! Fetches each file from the source host, summarizes it, derives an
//! embedding, and upserts the result. Binary and minified assets are
//! skipped with a neutral record instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use aufnahme_core::{JobId, UnitKey, UnitKind, UnitStatus, UnitWrite};
use aufnahme_llm::Summarizer;
use aufnahme_store::{JobStore, StoreError, UnitStore};

use crate::embedding::{embed_or_zero, Embedder};
use crate::scheduler::{run_batches, BatchOutcome, BatchProcessor, ProcessOutcome, ProgressSink, UnitError};
use crate::sourcehost::{RepoRef, SourceHost};

/// Extensions that are never worth summarizing.
const SKIP_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "svg", "pdf", "zip", "gz", "tar", "woff",
    "woff2", "ttf", "eot", "otf", "mp3", "mp4", "wav", "mov", "wasm", "lock", "map",
];

/// Minified bundle suffixes.
const SKIP_SUFFIXES: &[&str] = &[".min.js", ".min.css"];

fn is_skippable_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if SKIP_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return true;
    }
    match lower.rsplit_once('.') {
        Some((_, ext)) => SKIP_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn skip_summary(path: &str) -> String {
    format!("Skipped: binary or minified asset ({path}), not summarized.")
}

/// Indexes the files of one repository-ingestion job.
pub struct FileIndexer {
    job_id: JobId,
    repo: RepoRef,
    host: Arc<dyn SourceHost>,
    summarizer: Arc<Summarizer>,
    embedder: Arc<dyn Embedder>,
    units: Arc<dyn UnitStore>,
    jobs: Arc<dyn JobStore>,
    batch_size: usize,
}

impl FileIndexer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: JobId,
        repo: RepoRef,
        host: Arc<dyn SourceHost>,
        summarizer: Arc<Summarizer>,
        embedder: Arc<dyn Embedder>,
        units: Arc<dyn UnitStore>,
        jobs: Arc<dyn JobStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            job_id,
            repo,
            host,
            summarizer,
            embedder,
            units,
            jobs,
            batch_size,
        }
    }

    /// Index `paths`, skipping units the ledger already counts as
    /// processed, bumping the job's progress counter per completed group.
    pub async fn index_files(&self, paths: &[String]) -> Result<BatchOutcome, StoreError> {
        let processed = self.units.find_processed(self.job_id).await?;
        let pending: Vec<String> = paths
            .iter()
            .filter(|p| !processed.contains(p.as_str()))
            .cloned()
            .collect();

        if pending.len() < paths.len() {
            info!(
                job = %self.job_id,
                skipped = paths.len() - pending.len(),
                "resuming: some files already indexed"
            );
        }

        let sink = JobProgressSink {
            jobs: self.jobs.clone(),
            job_id: self.job_id,
        };
        run_batches(pending, self.batch_size, self, &sink).await
    }

    async fn record_failure(&self, path: &str, message: &str) -> Result<(), StoreError> {
        let key = UnitKey::new(self.job_id, path);
        self.units
            .upsert_unit(&key, UnitKind::File, &UnitWrite::failed(message))
            .await
    }
}

#[async_trait]
impl BatchProcessor for FileIndexer {
    type Unit = String;

    async fn process(&self, path: &String) -> Result<ProcessOutcome, StoreError> {
        let key = UnitKey::new(self.job_id, path);

        if is_skippable_path(path) {
            self.units
                .upsert_unit(&key, UnitKind::File, &UnitWrite::completed(skip_summary(path)))
                .await?;
            return Ok(ProcessOutcome::Done);
        }

        self.units
            .upsert_unit(
                &key,
                UnitKind::File,
                &UnitWrite {
                    status: Some(UnitStatus::Processing),
                    ..Default::default()
                },
            )
            .await?;

        let content = match self.host.fetch_file(&self.repo, path).await {
            Ok(content) => content,
            Err(e) => {
                let message = format!("fetch failed: {e}");
                self.record_failure(path, &message).await?;
                return Ok(ProcessOutcome::Failed(UnitError {
                    unit_key: path.clone(),
                    message,
                }));
            }
        };

        // Extension filters miss extensionless binaries; NUL bytes don't.
        if content.contains('\0') {
            self.units
                .upsert_unit(&key, UnitKind::File, &UnitWrite::completed(skip_summary(path)))
                .await?;
            return Ok(ProcessOutcome::Done);
        }

        let summary = match self.summarizer.summarize_file(path, &content).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                let message = "empty summary".to_string();
                self.record_failure(path, &message).await?;
                return Ok(ProcessOutcome::Failed(UnitError {
                    unit_key: path.clone(),
                    message,
                }));
            }
            Err(e) => {
                let message = format!("summarization failed: {e}");
                self.record_failure(path, &message).await?;
                return Ok(ProcessOutcome::Failed(UnitError {
                    unit_key: path.clone(),
                    message,
                }));
            }
        };

        let embedding = embed_or_zero(self.embedder.as_ref(), &summary).await;
        self.units
            .upsert_unit(
                &key,
                UnitKind::File,
                &UnitWrite::completed(summary).with_embedding(embedding),
            )
            .await?;

        Ok(ProcessOutcome::Done)
    }
}

struct JobProgressSink {
    jobs: Arc<dyn JobStore>,
    job_id: JobId,
}

#[async_trait]
impl ProgressSink for JobProgressSink {
    async fn group_completed(&self, group_len: usize) -> Result<(), StoreError> {
        self.jobs
            .add_processed_units(self.job_id, group_len as i32)
            .await?;
        Ok(())
    }
}
