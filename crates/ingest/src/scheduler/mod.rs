//! Batch/wave fan-out for enrichment work.
//!
//! Two shapes: sequential batches (file indexing — one group finishes
//! before the next starts, progress persisted per group) and
//! delayed-parallel waves (commit enrichment — every unit in a wave is
//! dispatched fire-and-forget with a staggered earliest start time).

pub mod batch;
pub mod waves;

pub use batch::{
    run_batches, BatchOutcome, BatchProcessor, NullProgress, ProcessOutcome, ProgressSink,
    UnitError,
};
pub use waves::{dispatch_waves, plan_waves, TaskDispatcher, WavePlan, WaveReceipt};
