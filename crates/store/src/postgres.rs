//! PostgreSQL ledger backend (sqlx + pgvector).

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use aufnahme_core::config::PostgresConfig;
use aufnahme_core::{
    is_usable_summary, EnrichmentUnit, Job, JobDescriptor, JobId, JobKind, JobStatus,
    InvalidTransition, OwnerId, UnitKey, UnitKind, UnitStatus, UnitWrite,
};

use crate::error::StoreError;
use crate::traits::{CheckpointStore, CreditStore, JobProgress, JobStore, UnitStore};

/// Create a connection pool and run migrations.
pub async fn connect(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;
    info!("PostgreSQL connected: {}", config.host);

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database migrations applied");

    Ok(pool)
}

/// Ledger backed by PostgreSQL.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const JOB_COLUMNS: &str = "id, kind, owner_id, status, source_url, total_units, \
                           processed_units, error, created_at, updated_at";

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(Job {
        id: row.try_get("id")?,
        kind: JobKind::from_str(&kind).map_err(StoreError::Decode)?,
        owner_id: row.try_get("owner_id")?,
        status: JobStatus::from_str(&status).map_err(StoreError::Decode)?,
        source_url: row.try_get("source_url")?,
        total_units: row.try_get("total_units")?,
        processed_units: row.try_get("processed_units")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn unit_from_row(row: &PgRow) -> Result<EnrichmentUnit, StoreError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let embedding: Option<Vector> = row.try_get("embedding")?;
    Ok(EnrichmentUnit {
        job_id: row.try_get("job_id")?,
        unit_key: row.try_get("unit_key")?,
        kind: UnitKind::from_str(&kind).map_err(StoreError::Decode)?,
        status: UnitStatus::from_str(&status).map_err(StoreError::Decode)?,
        summary: row.try_get("summary")?,
        embedding: embedding.map(|v| v.to_vec()),
        payload: row.try_get("payload")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl JobStore for PgLedger {
    async fn create_job(&self, descriptor: &JobDescriptor) -> Result<Job, StoreError> {
        // Re-delivery of the same descriptor leaves the existing row intact.
        sqlx::query(
            "INSERT INTO jobs (id, kind, owner_id, status, source_url, total_units)
             VALUES ($1, $2, $3, 'initializing', $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(descriptor.job_id)
        .bind(descriptor.kind.to_string())
        .bind(descriptor.owner_id)
        .bind(&descriptor.source_url)
        .bind(descriptor.unit_count_estimate as i32)
        .execute(&self.pool)
        .await?;

        self.get_job(descriptor.job_id).await
    }

    async fn get_job(&self, job_id: JobId) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("job", job_id))?;
        job_from_row(&row)
    }

    async fn advance(
        &self,
        job_id: JobId,
        next: JobStatus,
        progress: Option<JobProgress>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("job", job_id))?;
        let current: String = row.try_get("status")?;
        let current = JobStatus::from_str(&current).map_err(StoreError::Decode)?;

        if !current.can_advance_to(next) {
            return Err(InvalidTransition {
                from: current,
                to: next,
            }
            .into());
        }

        let progress = progress.unwrap_or_default();
        sqlx::query(
            "UPDATE jobs SET status = $2,
                    total_units = COALESCE($3, total_units),
                    processed_units = COALESCE($4, processed_units),
                    updated_at = now()
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(next.to_string())
        .bind(progress.total_units)
        .bind(progress.processed_units)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: JobId, error: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("job", job_id))?;
        let current: String = row.try_get("status")?;
        let current = JobStatus::from_str(&current).map_err(StoreError::Decode)?;

        if !current.can_advance_to(JobStatus::Failed) {
            return Err(InvalidTransition {
                from: current,
                to: JobStatus::Failed,
            }
            .into());
        }

        sqlx::query(
            "UPDATE jobs SET status = 'failed', error = $2, updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_processed_units(&self, job_id: JobId, delta: i32) -> Result<i32, StoreError> {
        // Monotonic and clamped: never exceeds total_units, never decreases.
        let row = sqlx::query(
            "UPDATE jobs
             SET processed_units = LEAST(total_units, processed_units + $2),
                 updated_at = now()
             WHERE id = $1
             RETURNING processed_units",
        )
        .bind(job_id)
        .bind(delta.max(0))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("job", job_id))?;
        Ok(row.try_get("processed_units")?)
    }

    async fn claim_next_runnable(
        &self,
        stale_after: Duration,
    ) -> Result<Option<Job>, StoreError> {
        // Claiming only touches updated_at; execution is at-least-once and
        // every step is idempotent, so a rare double claim is harmless.
        let row = sqlx::query(&format!(
            "UPDATE jobs SET updated_at = now()
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status NOT IN ('completed', 'failed')
                   AND (status = 'initializing'
                        OR updated_at < now() - make_interval(secs => $1))
                 ORDER BY created_at
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(stale_after.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }
}

#[async_trait]
impl UnitStore for PgLedger {
    async fn upsert_unit(
        &self,
        key: &UnitKey,
        kind: UnitKind,
        write: &UnitWrite,
    ) -> Result<(), StoreError> {
        let status = write.status.map(|s| s.to_string());
        let embedding = write.embedding.clone().map(Vector::from);

        sqlx::query(
            "INSERT INTO enrichment_units
                 (job_id, unit_key, kind, status, summary, embedding, payload, error)
             VALUES ($1, $2, $3, COALESCE($4, 'pending'), $5, $6, $7, $8)
             ON CONFLICT (job_id, unit_key) DO UPDATE SET
                 status = COALESCE($4, enrichment_units.status),
                 summary = COALESCE($5, enrichment_units.summary),
                 embedding = COALESCE($6, enrichment_units.embedding),
                 payload = COALESCE($7, enrichment_units.payload),
                 error = COALESCE($8, enrichment_units.error),
                 updated_at = now()",
        )
        .bind(key.job_id)
        .bind(&key.unit_key)
        .bind(kind.to_string())
        .bind(status)
        .bind(&write.summary)
        .bind(embedding)
        .bind(&write.payload)
        .bind(&write.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_processed(&self, job_id: JobId) -> Result<HashSet<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT unit_key, summary, payload FROM enrichment_units
             WHERE job_id = $1 AND status = 'completed'",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut processed = HashSet::new();
        for row in rows {
            let summary: Option<String> = row.try_get("summary")?;
            let payload: Option<serde_json::Value> = row.try_get("payload")?;
            let usable = match summary {
                Some(ref s) => is_usable_summary(s),
                None => payload.is_some(),
            };
            if usable {
                processed.insert(row.try_get("unit_key")?);
            }
        }
        Ok(processed)
    }

    async fn list_units(&self, job_id: JobId) -> Result<Vec<EnrichmentUnit>, StoreError> {
        let rows = sqlx::query(
            "SELECT job_id, unit_key, kind, status, summary, embedding, payload, error,
                    created_at, updated_at
             FROM enrichment_units
             WHERE job_id = $1
             ORDER BY unit_key",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(unit_from_row).collect()
    }
}

#[async_trait]
impl CheckpointStore for PgLedger {
    async fn get_checkpoint(
        &self,
        job_id: JobId,
        step_name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let row = sqlx::query(
            "SELECT result FROM step_checkpoints WHERE job_id = $1 AND step_name = $2",
        )
        .bind(job_id)
        .bind(step_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.try_get("result")).transpose().map_err(Into::into)
    }

    async fn put_checkpoint(
        &self,
        job_id: JobId,
        step_name: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO step_checkpoints (job_id, step_name, result)
             VALUES ($1, $2, $3)
             ON CONFLICT (job_id, step_name) DO UPDATE SET result = $3",
        )
        .bind(job_id)
        .bind(step_name)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CreditStore for PgLedger {
    async fn debit_once(
        &self,
        job_id: JobId,
        owner_id: OwnerId,
        amount: i64,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO credit_debits (job_id, owner_id, amount)
             VALUES ($1, $2, $3)
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(job_id)
        .bind(owner_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let applied = inserted == 1;
        if applied {
            sqlx::query(
                "INSERT INTO credit_balances (owner_id, balance)
                 VALUES ($1, 0 - $2)
                 ON CONFLICT (owner_id) DO UPDATE
                 SET balance = credit_balances.balance - $2",
            )
            .bind(owner_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(applied)
    }

    async fn grant(&self, owner_id: OwnerId, amount: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO credit_balances (owner_id, balance)
             VALUES ($1, $2)
             ON CONFLICT (owner_id) DO UPDATE
             SET balance = credit_balances.balance + $2",
        )
        .bind(owner_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn balance(&self, owner_id: OwnerId) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT balance FROM credit_balances WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => r.try_get("balance")?,
            None => 0,
        })
    }
}
