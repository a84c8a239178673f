use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SystemConfig;
use crate::engine::{Engine, EngineError, Inventory};
use crate::limits::MAX_ID_LEN;
use crate::model::*;
use crate::notify::OutcomeHub;
use crate::pool::{PoolState, WorkerPool};
use crate::queue::RequestQueue;
use crate::reporter::{run_reporter, StatsReport};
use crate::stats::Statistics;

/// The surface collaborators (CLI, UI) drive: submit, control processing,
/// inspect seats and counters, and subscribe to outcomes.
pub struct BookingSystem {
    inventory: Arc<Inventory>,
    stats: Arc<Statistics>,
    queue: Arc<RequestQueue>,
    notify: Arc<OutcomeHub>,
    pool: Arc<WorkerPool>,
    config: SystemConfig,
    shutdown: CancellationToken,
}

impl BookingSystem {
    pub fn new(config: SystemConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let stats = Arc::new(Statistics::new());
        let inventory = Arc::new(Inventory::new(config.seats, stats.clone()));
        let notify = Arc::new(OutcomeHub::new());
        let engine = Arc::new(Engine::new(
            inventory.clone(),
            stats.clone(),
            notify.clone(),
            config.engine.clone(),
        ));
        let queue = Arc::new(RequestQueue::new());
        let pool = Arc::new(WorkerPool::new(
            engine,
            queue.clone(),
            config.pool.clone(),
            config.strategy,
        ));

        info!(
            seats = config.seats,
            workers = config.pool.workers,
            lock_timeout_ms = config.engine.lock_timeout.as_millis() as u64,
            "booking system ready"
        );

        Ok(Self {
            inventory,
            stats,
            queue,
            notify,
            pool,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    // ── Requests ─────────────────────────────────────────────

    /// Queue a booking request. The seat is not checked here: a request for a
    /// seat that does not exist fails when processed, with `UnknownSeat`.
    pub fn submit_request(
        &self,
        requester: &str,
        seat_id: &str,
    ) -> Result<BookingRequest, EngineError> {
        validate_id(requester, "empty requester id", "requester id too long")?;
        validate_id(seat_id, "empty seat id", "seat id too long")?;
        let request = BookingRequest::new(requester, seat_id);
        self.queue.push(request.clone())?;
        Ok(request)
    }

    /// Queue a request from a random `User100`..`User999` for a random seat.
    pub fn submit_random(&self) -> Result<BookingRequest, EngineError> {
        let ids = self.inventory.ids();
        let mut rng = rand::thread_rng();
        let seat_id = ids
            .choose(&mut rng)
            .ok_or(EngineError::InvalidConfig("no seats"))?
            .clone();
        let requester = format!("User{}", rng.gen_range(100..1000));
        self.submit_request(&requester, &seat_id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // ── Processing control ───────────────────────────────────

    pub fn select_strategy(&self, strategy: Strategy) {
        self.pool.select_strategy(strategy);
    }

    pub fn strategy(&self) -> Strategy {
        self.pool.strategy()
    }

    pub fn start_processing(&self) -> bool {
        self.pool.start()
    }

    pub async fn stop_processing(&self) -> bool {
        self.pool.stop().await
    }

    pub fn pause(&self) -> bool {
        self.pool.pause()
    }

    pub fn resume(&self) -> bool {
        self.pool.resume()
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Drain the queue once, regardless of whether the pool is running, and wait
    /// for every outcome.
    pub async fn process_pending(&self) -> Vec<BookingOutcome> {
        self.pool.process_pending().await
    }

    /// Seats back to Available at version 0, counters zeroed, queue emptied.
    /// Requests the pool has drained but not started are dropped as well.
    /// Bookings already running are not interrupted and may land after the
    /// reset, but their results are not counted.
    pub fn reset_system(&self) {
        self.queue.clear();
        self.pool.reset();
        self.inventory.reset_all();
        self.stats.reset();
        info!("system reset");
    }

    /// Stop the reporter and the pool, letting running bookings finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.pool.stop().await;
        self.notify.prune();
    }

    // ── Seats ────────────────────────────────────────────────

    pub fn status(&self, seat_id: &str) -> SeatStatus {
        self.inventory.status(seat_id)
    }

    pub fn seat(&self, seat_id: &str) -> Option<SeatSnapshot> {
        self.inventory.snapshot(seat_id)
    }

    pub fn list_all_seats(&self) -> Vec<SeatSnapshot> {
        self.inventory.list()
    }

    /// See [`Inventory::cancel`] for the race with in-flight pessimistic bookings.
    pub fn cancel(&self, seat_id: &str) -> bool {
        let cancelled = self.inventory.cancel(seat_id);
        if cancelled {
            info!("booking cancelled: {seat_id}");
        }
        cancelled
    }

    pub fn cancel_random(&self) -> Option<String> {
        let seat_id = self.inventory.cancel_random()?;
        info!("random booking cancelled: {seat_id}");
        Some(seat_id)
    }

    // ── Observation ──────────────────────────────────────────

    pub fn snapshot_statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn report(&self) -> StatsReport {
        StatsReport::collect(&self.stats, &self.queue, &self.pool)
    }

    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<BookingOutcome> {
        self.notify.subscribe()
    }

    pub fn subscribe_seat(&self, seat_id: &str) -> broadcast::Receiver<BookingOutcome> {
        self.notify.subscribe_seat(seat_id)
    }

    /// Start publishing a [`StatsReport`] every `report_interval` until shutdown.
    pub fn spawn_reporter(&self) -> watch::Receiver<StatsReport> {
        let (tx, rx) = watch::channel(self.report());
        tokio::spawn(run_reporter(
            self.stats.clone(),
            self.queue.clone(),
            self.pool.clone(),
            self.config.report_interval,
            tx,
            self.shutdown.child_token(),
        ));
        rx
    }
}

fn validate_id(id: &str, empty: &'static str, too_long: &'static str) -> Result<(), EngineError> {
    if id.trim().is_empty() {
        return Err(EngineError::InvalidId(empty));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded(too_long));
    }
    Ok(())
}
