//! Fire-and-forget task dispatch onto the tokio runtime.
//!
//! Wave units are handed to a [`TokioDispatcher`], which spawns each one
//! as an independent task that sleeps until its scheduled dispatch time.
//! The caller never awaits completion; workers report through the ledger.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use aufnahme_ingest::executors::CommitEnricher;
use aufnahme_ingest::scheduler::TaskDispatcher;
use aufnahme_ingest::sourcehost::CommitInfo;

/// Processes one dispatched unit. Implementations own their error
/// handling — there is no caller left to propagate to.
#[async_trait]
pub trait DispatchHandler<T>: Send + Sync + 'static {
    async fn handle(&self, unit: T);
}

/// Dispatcher that spawns one tokio task per unit.
pub struct TokioDispatcher<H> {
    handler: Arc<H>,
}

impl<H> TokioDispatcher<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<T, H> TaskDispatcher<T> for TokioDispatcher<H>
where
    T: Send + 'static,
    H: DispatchHandler<T>,
{
    async fn dispatch(&self, unit: T, not_before: Duration) -> Result<(), String> {
        let handler = self.handler.clone();
        debug!(delay_ms = not_before.as_millis() as u64, "spawning wave task");
        tokio::spawn(async move {
            if !not_before.is_zero() {
                tokio::time::sleep(not_before).await;
            }
            handler.handle(unit).await;
        });
        Ok(())
    }
}

#[async_trait]
impl DispatchHandler<CommitInfo> for CommitEnricher {
    async fn handle(&self, commit: CommitInfo) {
        self.enrich_detached(commit).await;
    }
}
