use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{now_ms, Ms, StatsSnapshot, Strategy};
use crate::pool::{PoolState, WorkerPool};
use crate::queue::RequestQueue;
use crate::stats::Statistics;

/// Periodic view of the system for live display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub stats: StatsSnapshot,
    pub queued: usize,
    pub in_flight: usize,
    pub strategy: Strategy,
    pub state: PoolState,
    pub at: Ms,
}

impl StatsReport {
    pub fn collect(stats: &Statistics, queue: &RequestQueue, pool: &WorkerPool) -> Self {
        Self {
            stats: stats.snapshot(),
            queued: queue.len(),
            in_flight: pool.in_flight(),
            strategy: pool.strategy(),
            state: pool.state(),
            at: now_ms(),
        }
    }
}

/// Background task that publishes a [`StatsReport`] every `interval` until
/// cancelled or until every receiver is gone.
pub async fn run_reporter(
    stats: Arc<Statistics>,
    queue: Arc<RequestQueue>,
    pool: Arc<WorkerPool>,
    interval: Duration,
    tx: watch::Sender<StatsReport>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let report = StatsReport::collect(&stats, &queue, &pool);
        if tx.send(report).is_err() {
            debug!("all report receivers dropped, reporter exiting");
            break;
        }
    }
}
