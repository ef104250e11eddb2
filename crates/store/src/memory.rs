//! In-memory ledger backend.
//!
//! Mirrors the PostgreSQL backend's semantics (natural-key upsert,
//! transition validation, clamped progress, at-most-once debits) without a
//! database. Used by tests and `--dry-run` worker invocations.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use aufnahme_core::{
    is_usable_summary, EnrichmentUnit, Job, JobDescriptor, JobId, JobStatus, InvalidTransition,
    OwnerId, UnitKey, UnitKind, UnitStatus, UnitWrite,
};

use crate::error::StoreError;
use crate::traits::{CheckpointStore, CreditStore, JobProgress, JobStore, UnitStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    units: HashMap<(JobId, String), EnrichmentUnit>,
    checkpoints: HashMap<(JobId, String), serde_json::Value>,
    balances: HashMap<OwnerId, i64>,
    debits: HashMap<JobId, i64>,
}

/// Ledger backed by in-process maps.
#[derive(Default)]
pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryLedger {
    async fn create_job(&self, descriptor: &JobDescriptor) -> Result<Job, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let job = inner
            .jobs
            .entry(descriptor.job_id)
            .or_insert_with(|| Job {
                id: descriptor.job_id,
                kind: descriptor.kind,
                owner_id: descriptor.owner_id,
                status: JobStatus::Initializing,
                source_url: descriptor.source_url.clone(),
                total_units: descriptor.unit_count_estimate as i32,
                processed_units: 0,
                error: None,
                created_at: now,
                updated_at: now,
            });
        Ok(job.clone())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Job, StoreError> {
        let inner = self.inner.read().await;
        inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("job", job_id))
    }

    async fn advance(
        &self,
        job_id: JobId,
        next: JobStatus,
        progress: Option<JobProgress>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::not_found("job", job_id))?;

        if !job.status.can_advance_to(next) {
            return Err(InvalidTransition {
                from: job.status,
                to: next,
            }
            .into());
        }

        job.status = next;
        if let Some(p) = progress {
            if let Some(total) = p.total_units {
                job.total_units = total;
            }
            if let Some(processed) = p.processed_units {
                job.processed_units = processed;
            }
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, job_id: JobId, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::not_found("job", job_id))?;

        if !job.status.can_advance_to(JobStatus::Failed) {
            return Err(InvalidTransition {
                from: job.status,
                to: JobStatus::Failed,
            }
            .into());
        }

        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn add_processed_units(&self, job_id: JobId, delta: i32) -> Result<i32, StoreError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::not_found("job", job_id))?;

        job.processed_units = (job.processed_units + delta.max(0)).min(job.total_units);
        job.updated_at = Utc::now();
        Ok(job.processed_units)
    }

    async fn claim_next_runnable(
        &self,
        stale_after: Duration,
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.write().await;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::zero());

        let next = {
            let mut candidates: Vec<&Job> = inner
                .jobs
                .values()
                .filter(|j| !j.status.is_terminal())
                .filter(|j| j.status == JobStatus::Initializing || j.updated_at < cutoff)
                .collect();
            candidates.sort_by_key(|j| j.created_at);
            candidates.first().map(|j| j.id)
        };

        let Some(id) = next else {
            return Ok(None);
        };
        let job = inner.jobs.get_mut(&id).expect("candidate exists");
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }
}

#[async_trait]
impl UnitStore for MemoryLedger {
    async fn upsert_unit(
        &self,
        key: &UnitKey,
        kind: UnitKind,
        write: &UnitWrite,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let unit = inner
            .units
            .entry((key.job_id, key.unit_key.clone()))
            .or_insert_with(|| EnrichmentUnit {
                job_id: key.job_id,
                unit_key: key.unit_key.clone(),
                kind,
                status: UnitStatus::Pending,
                summary: None,
                embedding: None,
                payload: None,
                error: None,
                created_at: now,
                updated_at: now,
            });

        if let Some(status) = write.status {
            unit.status = status;
        }
        if let Some(ref summary) = write.summary {
            unit.summary = Some(summary.clone());
        }
        if let Some(ref embedding) = write.embedding {
            unit.embedding = Some(embedding.clone());
        }
        if let Some(ref payload) = write.payload {
            unit.payload = Some(payload.clone());
        }
        if let Some(ref error) = write.error {
            unit.error = Some(error.clone());
        }
        unit.updated_at = now;
        Ok(())
    }

    async fn find_processed(&self, job_id: JobId) -> Result<HashSet<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .units
            .values()
            .filter(|u| u.job_id == job_id && u.status == UnitStatus::Completed)
            .filter(|u| match u.summary {
                Some(ref s) => is_usable_summary(s),
                None => u.payload.is_some(),
            })
            .map(|u| u.unit_key.clone())
            .collect())
    }

    async fn list_units(&self, job_id: JobId) -> Result<Vec<EnrichmentUnit>, StoreError> {
        let inner = self.inner.read().await;
        let mut units: Vec<EnrichmentUnit> = inner
            .units
            .values()
            .filter(|u| u.job_id == job_id)
            .cloned()
            .collect();
        units.sort_by(|a, b| a.unit_key.cmp(&b.unit_key));
        Ok(units)
    }
}

#[async_trait]
impl CheckpointStore for MemoryLedger {
    async fn get_checkpoint(
        &self,
        job_id: JobId,
        step_name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.checkpoints.get(&(job_id, step_name.to_string())).cloned())
    }

    async fn put_checkpoint(
        &self,
        job_id: JobId,
        step_name: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .checkpoints
            .insert((job_id, step_name.to_string()), result.clone());
        Ok(())
    }
}

#[async_trait]
impl CreditStore for MemoryLedger {
    async fn debit_once(
        &self,
        job_id: JobId,
        owner_id: OwnerId,
        amount: i64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.debits.contains_key(&job_id) {
            return Ok(false);
        }
        inner.debits.insert(job_id, amount);
        *inner.balances.entry(owner_id).or_insert(0) -= amount;
        Ok(true)
    }

    async fn grant(&self, owner_id: OwnerId, amount: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        *inner.balances.entry(owner_id).or_insert(0) += amount;
        Ok(())
    }

    async fn balance(&self, owner_id: OwnerId) -> Result<i64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.balances.get(&owner_id).copied().unwrap_or(0))
    }
}
