//! Persistence traits injected into the pipeline.
//!
//! The orchestrator and stage executors only ever see these traits; whether
//! the backend is Postgres or an in-memory map is a wiring decision.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use aufnahme_core::{
    EnrichmentUnit, Job, JobDescriptor, JobId, JobStatus, OwnerId, UnitKey, UnitKind, UnitWrite,
};

use crate::error::StoreError;

/// Progress counters written alongside a status transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobProgress {
    pub total_units: Option<i32>,
    pub processed_units: Option<i32>,
}

impl JobProgress {
    pub fn total(total: i32) -> Self {
        Self {
            total_units: Some(total),
            ..Default::default()
        }
    }
}

/// Job rows: creation, status transitions, progress counters, worker claims.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job from a validated descriptor. Re-delivery of the same
    /// descriptor is a no-op (the existing row wins).
    async fn create_job(&self, descriptor: &JobDescriptor) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: JobId) -> Result<Job, StoreError>;

    /// Advance the job's status, optionally updating progress counters, as a
    /// single persisted write. Rejects transitions the state machine forbids
    /// and propagates every persistence failure to the caller.
    async fn advance(
        &self,
        job_id: JobId,
        next: JobStatus,
        progress: Option<JobProgress>,
    ) -> Result<(), StoreError>;

    /// Transition to `Failed`, recording the error string.
    async fn mark_failed(&self, job_id: JobId, error: &str) -> Result<(), StoreError>;

    /// Bump `processed_units` by `delta`. Monotonically non-decreasing and
    /// clamped so it never exceeds `total_units`. Returns the new value.
    async fn add_processed_units(&self, job_id: JobId, delta: i32) -> Result<i32, StoreError>;

    /// Claim the next runnable job: freshly enqueued, or non-terminal and
    /// untouched for longer than `stale_after` (an interrupted run to
    /// resume). Claiming touches `updated_at` so concurrent workers skip it.
    async fn claim_next_runnable(
        &self,
        stale_after: Duration,
    ) -> Result<Option<Job>, StoreError>;
}

/// Enrichment-unit rows, addressed by natural key.
#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Insert-or-update by `(job_id, unit_key)`. Repeated delivery of the
    /// same unit converges to one record; the natural key is never touched.
    async fn upsert_unit(
        &self,
        key: &UnitKey,
        kind: UnitKind,
        write: &UnitWrite,
    ) -> Result<(), StoreError>;

    /// Keys of units that count as processed: status `Completed` AND a
    /// usable result (see `aufnahme_core::is_usable_summary`). Used to
    /// compute the complement before scheduling a retry.
    async fn find_processed(&self, job_id: JobId) -> Result<HashSet<String>, StoreError>;

    async fn list_units(&self, job_id: JobId) -> Result<Vec<EnrichmentUnit>, StoreError>;
}

/// Step checkpoints keyed by `(job_id, step_name)`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_checkpoint(
        &self,
        job_id: JobId,
        step_name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Persist a step result. Writing the same checkpoint twice is safe.
    async fn put_checkpoint(
        &self,
        job_id: JobId,
        step_name: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Per-owner credit balance.
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Debit `amount` from the owner's balance, at most once per job. The
    /// debit is recorded under the job id, so re-executing the settlement
    /// step is a no-op. Returns `true` when the debit was applied by this
    /// call, `false` when it had already been applied.
    async fn debit_once(
        &self,
        job_id: JobId,
        owner_id: OwnerId,
        amount: i64,
    ) -> Result<bool, StoreError>;

    /// Add credits to an owner's balance (top-up).
    async fn grant(&self, owner_id: OwnerId, amount: i64) -> Result<(), StoreError>;

    async fn balance(&self, owner_id: OwnerId) -> Result<i64, StoreError>;
}

/// The full ledger surface the orchestrator is wired with.
pub trait Ledger: JobStore + UnitStore + CheckpointStore + CreditStore {}

impl<T: JobStore + UnitStore + CheckpointStore + CreditStore> Ledger for T {}
