use async_trait::async_trait;
use tracing::{debug, warn};

use aufnahme_store::StoreError;

/// One unit's failure inside a batch. Recorded, never propagated — a
/// failing unit must not block its siblings.
#[derive(Debug, Clone)]
pub struct UnitError {
    pub unit_key: String,
    pub message: String,
}

/// Per-unit result. Infrastructure (persistence) failures are NOT a
/// `Failed` outcome — they travel through the `Err` channel of
/// [`BatchProcessor::process`] and abort the run.
#[derive(Debug)]
pub enum ProcessOutcome {
    Done,
    Failed(UnitError),
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub processed_count: usize,
    pub error_count: usize,
    pub errors: Vec<UnitError>,
}

/// Processes one unit of a sequential batch.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    type Unit: Send + Sync;

    async fn process(&self, unit: &Self::Unit) -> Result<ProcessOutcome, StoreError>;
}

/// Persists observable progress after each completed group.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn group_completed(&self, group_len: usize) -> Result<(), StoreError>;
}

/// No-op sink for callers that track progress elsewhere.
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn group_completed(&self, _group_len: usize) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Drive `units` through `processor` in groups of `batch_size`.
///
/// Groups run strictly in order; one group completes fully before the next
/// starts. Per-unit errors accumulate in the outcome. After each group the
/// sink persists the progress counter, so partial completion is observable
/// and resumable. Persistence failures — from the processor or the sink —
/// abort the run and propagate.
pub async fn run_batches<P: BatchProcessor>(
    units: Vec<P::Unit>,
    batch_size: usize,
    processor: &P,
    progress: &dyn ProgressSink,
) -> Result<BatchOutcome, StoreError> {
    let batch_size = batch_size.max(1);
    let mut outcome = BatchOutcome::default();

    for (group_index, group) in units.chunks(batch_size).enumerate() {
        debug!(group_index, group_len = group.len(), "processing batch group");
        for unit in group {
            match processor.process(unit).await? {
                ProcessOutcome::Done => outcome.processed_count += 1,
                ProcessOutcome::Failed(e) => {
                    warn!(unit = %e.unit_key, error = %e.message, "unit failed in batch");
                    outcome.error_count += 1;
                    outcome.errors.push(e);
                }
            }
        }
        progress.group_completed(group.len()).await?;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails every unit whose key contains "bad"; records processing order.
    struct RecordingProcessor {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingProcessor {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BatchProcessor for RecordingProcessor {
        type Unit = String;

        async fn process(&self, unit: &String) -> Result<ProcessOutcome, StoreError> {
            self.seen.lock().unwrap().push(unit.clone());
            if unit.contains("bad") {
                Ok(ProcessOutcome::Failed(UnitError {
                    unit_key: unit.clone(),
                    message: "summarization error".into(),
                }))
            } else {
                Ok(ProcessOutcome::Done)
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        groups: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn group_completed(&self, group_len: usize) -> Result<(), StoreError> {
            self.groups.lock().unwrap().push(group_len);
            Ok(())
        }
    }

    #[tokio::test]
    async fn groups_run_in_order_and_progress_per_group() {
        let processor = RecordingProcessor::new();
        let sink = RecordingSink::default();
        let units: Vec<String> = (0..7).map(|i| format!("file-{i}")).collect();

        let outcome = run_batches(units.clone(), 3, &processor, &sink).await.unwrap();

        assert_eq!(outcome.processed_count, 7);
        assert_eq!(outcome.error_count, 0);
        // Units execute in input order, groups of 3/3/1.
        assert_eq!(*processor.seen.lock().unwrap(), units);
        assert_eq!(*sink.groups.lock().unwrap(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn one_failing_unit_does_not_block_siblings() {
        let processor = RecordingProcessor::new();
        let units = vec![
            "a.rs".to_string(),
            "bad.rs".to_string(),
            "c.rs".to_string(),
        ];

        let outcome = run_batches(units, 2, &processor, &NullProgress).await.unwrap();

        assert_eq!(outcome.processed_count, 2);
        assert_eq!(outcome.error_count, 1);
        assert_eq!(outcome.errors[0].unit_key, "bad.rs");
        // All three units were attempted.
        assert_eq!(processor.seen.lock().unwrap().len(), 3);
    }

    /// Processor whose persistence layer is down.
    struct BrokenStoreProcessor;

    #[async_trait]
    impl BatchProcessor for BrokenStoreProcessor {
        type Unit = String;

        async fn process(&self, _unit: &String) -> Result<ProcessOutcome, StoreError> {
            Err(StoreError::not_found("job", "gone"))
        }
    }

    #[tokio::test]
    async fn persistence_failure_aborts_the_run() {
        let result = run_batches(
            vec!["a.rs".to_string(), "b.rs".to_string()],
            2,
            &BrokenStoreProcessor,
            &NullProgress,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_batch_size_is_clamped() {
        let processor = RecordingProcessor::new();
        let outcome = run_batches(vec!["x.rs".to_string()], 0, &processor, &NullProgress)
            .await
            .unwrap();
        assert_eq!(outcome.processed_count, 1);
    }

    #[tokio::test]
    async fn empty_input_is_a_noop() {
        let processor = RecordingProcessor::new();
        let sink = RecordingSink::default();
        let outcome = run_batches(Vec::<String>::new(), 5, &processor, &sink)
            .await
            .unwrap();
        assert_eq!(outcome.processed_count, 0);
        assert!(sink.groups.lock().unwrap().is_empty());
    }
}
