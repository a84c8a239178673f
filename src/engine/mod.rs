mod delay;
mod error;
mod inventory;

pub use delay::ProcessingDelay;
pub use error::EngineError;
pub use inventory::{seat_label, Inventory, Seat, SharedSeat};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::model::*;
use crate::notify::OutcomeHub;
use crate::stats::Statistics;

/// Tunables for a single booking attempt.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a pessimistic attempt waits for the seat's token. Long enough to
    /// let one in-flight booking finish, short enough to never block for long.
    pub lock_timeout: Duration,
    pub delay: ProcessingDelay,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(100),
            delay: ProcessingDelay::Uniform {
                min: Duration::from_millis(30),
                max: Duration::from_millis(80),
            },
        }
    }
}

/// Runs one booking request against the inventory under a chosen strategy.
pub struct Engine {
    pub inventory: Arc<Inventory>,
    pub stats: Arc<Statistics>,
    pub notify: Arc<OutcomeHub>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        inventory: Arc<Inventory>,
        stats: Arc<Statistics>,
        notify: Arc<OutcomeHub>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inventory,
            stats,
            notify,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Attempt the booking, record it, publish it. Never retries: a failed
    /// attempt is final and resubmission is up to the caller.
    pub async fn process(&self, request: &BookingRequest, strategy: Strategy) -> BookingOutcome {
        let generation = self.stats.record_attempt();
        let start = Instant::now();

        let result = match strategy {
            Strategy::Optimistic => self.book_optimistic(&request.seat_id).await,
            Strategy::Pessimistic => {
                self.inventory
                    .try_pessimistic_book(
                        &request.seat_id,
                        self.config.lock_timeout,
                        &self.config.delay,
                    )
                    .await
            }
        };

        if !self.stats.record_result(generation, result) {
            debug!(request_id = %request.id, "statistics reset during booking, result not counted");
        }
        let outcome = Outcome::from(result);

        metrics::counter!(
            crate::observability::BOOKINGS_TOTAL,
            "strategy" => strategy.label(),
            "outcome" => outcome.label()
        )
        .increment(1);
        metrics::histogram!(
            crate::observability::BOOKING_DURATION_SECONDS,
            "strategy" => strategy.label()
        )
        .record(start.elapsed().as_secs_f64());

        let outcome = BookingOutcome {
            request: request.clone(),
            strategy,
            outcome,
            completed_at: now_ms(),
        };
        debug!(request_id = %request.id, "{outcome}");
        self.notify.send(&outcome);
        outcome
    }

    /// Snapshot, simulate the work, then compare-and-swap against the snapshotted version.
    async fn book_optimistic(&self, seat_id: &str) -> Result<(), FailureReason> {
        let snapshot = self
            .inventory
            .snapshot(seat_id)
            .ok_or(FailureReason::UnknownSeat)?;
        if snapshot.status != SeatStatus::Available {
            return Err(FailureReason::Unavailable);
        }
        self.config.delay.wait().await;
        self.inventory.try_optimistic_book(seat_id, snapshot.version)
    }
}
