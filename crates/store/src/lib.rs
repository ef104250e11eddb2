//! Idempotent ledger — the persistence layer behind the ingestion pipeline.
//!
//! Everything the pipeline writes goes through the traits in [`traits`]:
//! job status/progress, enrichment-unit upserts, step checkpoints, and the
//! per-owner credit balance. Two backends are provided: [`PgLedger`] (sqlx +
//! pgvector) for production and [`MemoryLedger`] for tests and dry runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryLedger;
pub use postgres::{connect, PgLedger};
pub use traits::{CheckpointStore, CreditStore, JobProgress, JobStore, Ledger, UnitStore};
