use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One unit with its scheduled earliest dispatch time.
///
/// The tier delay (`base_delay`) and the random jitter are kept separate:
/// the tier is a contract (wave N starts no earlier than N * wave_delay),
/// the jitter only spreads contact with the external API inside a wave.
#[derive(Debug, Clone)]
pub struct PlannedDispatch<T> {
    pub unit: T,
    pub wave_index: usize,
    pub base_delay: Duration,
    pub jitter: Duration,
}

impl<T> PlannedDispatch<T> {
    pub fn earliest_start(&self) -> Duration {
        self.base_delay + self.jitter
    }
}

/// Wave assignment for a whole collection of units.
#[derive(Debug)]
pub struct WavePlan<T> {
    pub dispatches: Vec<PlannedDispatch<T>>,
    pub wave_count: usize,
    pub estimated_seconds: u64,
}

/// Summary returned to the caller after fire-and-forget dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveReceipt {
    pub queued_count: usize,
    pub wave_count: usize,
    pub estimated_seconds: u64,
}

/// Fire-and-forget executor for wave units. Implementations enqueue the
/// unit to run no earlier than `not_before` and return immediately.
#[async_trait]
pub trait TaskDispatcher<T>: Send + Sync {
    async fn dispatch(&self, unit: T, not_before: Duration) -> Result<(), String>;
}

/// Partition `units` into waves of `wave_size` and assign dispatch delays.
///
/// Every unit in wave N gets `base_delay = N * wave_delay` plus a jitter
/// drawn uniformly from `[0, jitter_max]`. Units in different waves carry
/// no ordering guarantee beyond the non-decreasing earliest start.
pub fn plan_waves<T>(
    units: Vec<T>,
    wave_size: usize,
    wave_delay: Duration,
    jitter_max: Duration,
) -> WavePlan<T> {
    let wave_size = wave_size.max(1);
    let wave_count = units.len().div_ceil(wave_size);
    let mut rng = rand::thread_rng();

    let dispatches = units
        .into_iter()
        .enumerate()
        .map(|(i, unit)| {
            let wave_index = i / wave_size;
            let jitter_ms = if jitter_max.is_zero() {
                0
            } else {
                rng.gen_range(0..=jitter_max.as_millis() as u64)
            };
            PlannedDispatch {
                unit,
                wave_index,
                base_delay: wave_delay * wave_index as u32,
                jitter: Duration::from_millis(jitter_ms),
            }
        })
        .collect();

    WavePlan {
        dispatches,
        wave_count,
        estimated_seconds: wave_count as u64 * wave_delay.as_secs(),
    }
}

/// Hand every planned unit to the dispatcher. Dispatch is fire-and-forget:
/// the caller gets a receipt, not completion — workers terminate on their
/// own schedule and report through the ledger.
pub async fn dispatch_waves<T: Send>(
    plan: WavePlan<T>,
    dispatcher: &dyn TaskDispatcher<T>,
) -> Result<WaveReceipt, String> {
    let receipt = WaveReceipt {
        queued_count: plan.dispatches.len(),
        wave_count: plan.wave_count,
        estimated_seconds: plan.estimated_seconds,
    };

    for planned in plan.dispatches {
        let not_before = planned.earliest_start();
        dispatcher.dispatch(planned.unit, not_before).await?;
    }

    info!(
        queued = receipt.queued_count,
        waves = receipt.wave_count,
        eta_secs = receipt.estimated_seconds,
        "waves dispatched"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn wave_delay_tiers_are_exact() {
        let units: Vec<u32> = (0..7).collect();
        let plan = plan_waves(units, 3, Duration::from_secs(20), Duration::ZERO);

        assert_eq!(plan.wave_count, 3);
        let delays: Vec<u64> = plan.dispatches.iter().map(|d| d.base_delay.as_secs()).collect();
        assert_eq!(delays, vec![0, 0, 0, 20, 20, 20, 40]);
        // With zero jitter the earliest start equals the tier delay.
        assert!(plan.dispatches.iter().all(|d| d.jitter.is_zero()));
    }

    #[test]
    fn jitter_is_bounded() {
        let units: Vec<u32> = (0..50).collect();
        let jitter_max = Duration::from_secs(3);
        let plan = plan_waves(units, 5, Duration::from_secs(20), jitter_max);

        for d in &plan.dispatches {
            assert!(d.jitter <= jitter_max, "jitter {:?} exceeds bound", d.jitter);
            // Jitter never lowers a unit below its tier.
            assert!(d.earliest_start() >= d.base_delay);
        }
    }

    #[test]
    fn single_wave_when_units_fit() {
        let plan = plan_waves(vec![1, 2], 5, Duration::from_secs(20), Duration::ZERO);
        assert_eq!(plan.wave_count, 1);
        assert!(plan.dispatches.iter().all(|d| d.base_delay.is_zero()));
    }

    #[test]
    fn empty_plan() {
        let plan = plan_waves(Vec::<u32>::new(), 5, Duration::from_secs(20), Duration::ZERO);
        assert_eq!(plan.wave_count, 0);
        assert_eq!(plan.estimated_seconds, 0);
        assert!(plan.dispatches.is_empty());
    }

    struct CollectingDispatcher {
        seen: Mutex<Vec<(u32, Duration)>>,
    }

    #[async_trait]
    impl TaskDispatcher<u32> for CollectingDispatcher {
        async fn dispatch(&self, unit: u32, not_before: Duration) -> Result<(), String> {
            self.seen.lock().unwrap().push((unit, not_before));
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_returns_receipt_without_awaiting_workers() {
        let dispatcher = CollectingDispatcher {
            seen: Mutex::new(Vec::new()),
        };
        let plan = plan_waves((0..7).collect(), 3, Duration::from_secs(20), Duration::ZERO);

        let receipt = dispatch_waves(plan, &dispatcher).await.unwrap();

        assert_eq!(receipt.queued_count, 7);
        assert_eq!(receipt.wave_count, 3);
        assert_eq!(receipt.estimated_seconds, 60);

        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(seen.len(), 7);
        assert_eq!(seen[6].1, Duration::from_secs(40));
    }
}
