//! Durable step sequencing.
//!
//! Every named pipeline step runs through [`StepSequencer::run_step`]: the
//! step's result is persisted as a checkpoint before the pipeline moves
//! on, and a restarted run replays checkpointed steps as no-ops. Step
//! functions must be idempotent or side-effect-free on re-execution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use aufnahme_core::JobId;
use aufnahme_store::CheckpointStore;

use crate::error::PipelineError;

pub struct StepSequencer {
    checkpoints: Arc<dyn CheckpointStore>,
    job_id: JobId,
    attempts: u32,
    retry_delay: Duration,
}

impl StepSequencer {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        job_id: JobId,
        attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            checkpoints,
            job_id,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    /// Execute a named step, durably.
    ///
    /// If a checkpoint for `(job_id, name)` exists, its stored result is
    /// returned without executing `f`. Otherwise `f` runs with bounded
    /// retries and a fixed inter-attempt delay; on success the result is
    /// checkpointed before it is returned. Checkpoint-store failures
    /// propagate immediately — swallowing one would desynchronize the
    /// in-memory run from durable state.
    pub async fn run_step<T, F, Fut>(&self, name: &str, f: F) -> Result<T, PipelineError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        if let Some(value) = self.checkpoints.get_checkpoint(self.job_id, name).await? {
            debug!(job = %self.job_id, step = name, "checkpoint hit, replaying result");
            return Ok(serde_json::from_value(value)?);
        }

        let mut last_error: Option<PipelineError> = None;
        for attempt in 1..=self.attempts {
            match f().await {
                Ok(result) => {
                    let value = serde_json::to_value(&result)?;
                    self.checkpoints
                        .put_checkpoint(self.job_id, name, &value)
                        .await?;
                    debug!(job = %self.job_id, step = name, attempt, "step completed");
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        job = %self.job_id,
                        step = name,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "step attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(PipelineError::StepExhausted {
            step: name.to_string(),
            attempts: self.attempts,
            source: Box::new(last_error.expect("at least one attempt ran")),
        })
    }
}
