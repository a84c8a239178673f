use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::model::{BookingOutcome, Strategy};
use crate::queue::RequestQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    /// Not dispatching. Requests can still be processed with [`WorkerPool::process_pending`].
    Idle,
    Running,
    Paused,
    /// Dispatch halted, waiting for in-flight bookings to finish.
    Stopping,
}

impl PoolState {
    fn halts_dispatch(&self) -> bool {
        matches!(self, PoolState::Paused | PoolState::Stopping)
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on concurrently running bookings.
    pub workers: usize,
    /// Fallback wakeup for the dispatcher when no push notification arrives.
    pub poll_interval: Duration,
    /// How long `stop` waits for in-flight bookings.
    pub drain_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            poll_interval: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Bounded pool driving the engine over queued requests.
///
/// A dispatcher task waits on the queue and hands each request to its own task,
/// holding one semaphore slot per running booking. Stopping is cooperative: the
/// dispatcher stops handing out work, undispatched requests go back to the queue,
/// and bookings already running finish on their own.
pub struct WorkerPool {
    engine: Arc<Engine>,
    queue: Arc<RequestQueue>,
    slots: Arc<Semaphore>,
    /// Running bookings. Counts and drains them independently of the slots.
    tasks: TaskTracker,
    /// Bumped by [`WorkerPool::reset`]; drained batches from an older epoch are dropped.
    epoch: watch::Sender<u64>,
    config: PoolConfig,
    strategy: RwLock<Strategy>,
    state: watch::Sender<PoolState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        engine: Arc<Engine>,
        queue: Arc<RequestQueue>,
        config: PoolConfig,
        strategy: Strategy,
    ) -> Self {
        Self {
            engine,
            queue,
            slots: Arc::new(Semaphore::new(config.workers)),
            tasks: TaskTracker::new(),
            epoch: watch::channel(0).0,
            config,
            strategy: RwLock::new(strategy),
            state: watch::channel(PoolState::Idle).0,
            dispatcher: Mutex::new(None),
        }
    }

    pub fn strategy(&self) -> Strategy {
        *self.strategy.read()
    }

    /// Applies to requests dispatched from now on; running bookings keep theirs.
    pub fn select_strategy(&self, strategy: Strategy) {
        *self.strategy.write() = strategy;
        info!("strategy set to {strategy}");
    }

    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PoolState> {
        self.state.subscribe()
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Discard requests already taken from the queue but not yet handed to a
    /// worker. Bookings already running are not touched.
    pub fn reset(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
        debug!("dispatch epoch advanced");
    }

    /// Spawn the dispatcher. Returns false if the pool is not idle.
    pub fn start(self: &Arc<Self>) -> bool {
        let started = self.state.send_if_modified(|s| {
            if *s == PoolState::Idle {
                *s = PoolState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return false;
        }
        let handle = tokio::spawn(run_dispatcher(self.clone()));
        *self.dispatcher.lock() = Some(handle);
        info!(
            workers = self.config.workers,
            "processing started with {} locking",
            self.strategy()
        );
        true
    }

    pub fn pause(&self) -> bool {
        let paused = self.transition(PoolState::Running, PoolState::Paused);
        if paused {
            info!("processing paused");
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let resumed = self.transition(PoolState::Paused, PoolState::Running);
        if resumed {
            info!("processing resumed");
        }
        resumed
    }

    fn transition(&self, from: PoolState, to: PoolState) -> bool {
        self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        })
    }

    /// Halt dispatch and wait (up to the drain timeout) for running bookings.
    /// Returns false if the pool was not running or paused.
    pub async fn stop(&self) -> bool {
        let stopping = self.state.send_if_modified(|s| match s {
            PoolState::Running | PoolState::Paused => {
                *s = PoolState::Stopping;
                true
            }
            PoolState::Idle | PoolState::Stopping => false,
        });
        if !stopping {
            return false;
        }

        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("dispatcher task failed: {e}");
        }

        info!("draining in-flight bookings...");
        if self.wait_idle().await {
            info!("all bookings drained");
        }
        self.state.send_replace(PoolState::Idle);
        info!(queued = self.queue.len(), "processing stopped");
        true
    }

    /// Wait until no booking is running, bounded by the drain timeout.
    pub async fn wait_idle(&self) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(self.config.drain_timeout, self.tasks.wait())
            .await
            .is_ok();
        self.tasks.reopen();
        if !drained {
            warn!(in_flight = self.in_flight(), "drain timeout, bookings still running");
        }
        drained
    }

    /// Take everything queued and hand each request to a worker as a slot frees
    /// up. If the pool is paused or stopped part-way, the rest goes back to the
    /// head of the queue. If the pool is reset part-way, the rest is dropped.
    /// An empty queue dispatches nothing.
    pub async fn drain_and_dispatch(&self) -> Vec<JoinHandle<BookingOutcome>> {
        let mut epoch_rx = self.epoch.subscribe();
        let pending = self.queue.drain();
        if pending.is_empty() {
            return Vec::new();
        }

        let strategy = self.strategy();
        let mut state_rx = self.state.subscribe();
        let mut handles = Vec::with_capacity(pending.len());
        let mut pending = pending.into_iter();

        while let Some(request) = pending.next() {
            let next = tokio::select! {
                biased;
                _ = epoch_rx.changed() => Dispatch::Reset,
                _ = dispatch_halted(&mut state_rx) => Dispatch::Halted,
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => Dispatch::Run(permit),
                    Err(_) => Dispatch::Halted,
                },
            };
            let permit = match next {
                Dispatch::Run(permit) => permit,
                Dispatch::Halted => {
                    let mut rest = vec![request];
                    rest.extend(pending.by_ref());
                    debug!(count = rest.len(), "dispatch halted, requeueing");
                    self.queue.requeue_front(rest);
                    break;
                }
                Dispatch::Reset => {
                    let dropped = 1 + pending.by_ref().count();
                    debug!(dropped, "pool reset, dropping drained requests");
                    break;
                }
            };

            let engine = self.engine.clone();
            handles.push(self.tasks.spawn(async move {
                let _permit = permit;
                metrics::gauge!(crate::observability::WORKERS_BUSY).increment(1.0);
                let outcome = engine.process(&request, strategy).await;
                metrics::gauge!(crate::observability::WORKERS_BUSY).decrement(1.0);
                outcome
            }));
        }

        handles
    }

    /// Drain the queue once and wait for every outcome.
    pub async fn process_pending(&self) -> Vec<BookingOutcome> {
        let handles = self.drain_and_dispatch().await;
        let mut outcomes = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("booking task failed: {e}"),
            }
        }
        outcomes
    }
}

enum Dispatch {
    Run(OwnedSemaphorePermit),
    Halted,
    Reset,
}

/// Resolves once the pool is paused or stopping (or the pool is gone).
async fn dispatch_halted(rx: &mut watch::Receiver<PoolState>) {
    loop {
        if rx.borrow_and_update().halts_dispatch() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_dispatcher(pool: Arc<WorkerPool>) {
    let mut state_rx = pool.state.subscribe();
    loop {
        let state = *state_rx.borrow_and_update();
        match state {
            PoolState::Running => {}
            PoolState::Paused => {
                if state_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }
            PoolState::Idle | PoolState::Stopping => break,
        }

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = pool.queue.wait_for_work(pool.config.poll_interval) => {}
        }

        let dispatched = pool.drain_and_dispatch().await;
        if !dispatched.is_empty() {
            debug!(count = dispatched.len(), "dispatched booking requests");
        }
    }
    debug!("dispatcher exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, Inventory, ProcessingDelay};
    use crate::model::*;
    use crate::notify::OutcomeHub;
    use crate::stats::Statistics;

    fn make_pool(
        seats: usize,
        workers: usize,
        delay: ProcessingDelay,
    ) -> (Arc<WorkerPool>, Arc<RequestQueue>, Arc<Engine>) {
        let stats = Arc::new(Statistics::new());
        let inventory = Arc::new(Inventory::new(seats, stats.clone()));
        let engine = Arc::new(Engine::new(
            inventory,
            stats,
            Arc::new(OutcomeHub::new()),
            EngineConfig {
                lock_timeout: Duration::from_millis(100),
                delay,
            },
        ));
        let queue = Arc::new(RequestQueue::new());
        let pool = Arc::new(WorkerPool::new(
            engine.clone(),
            queue.clone(),
            PoolConfig {
                workers,
                poll_interval: Duration::from_millis(10),
                drain_timeout: Duration::from_secs(5),
            },
            Strategy::Optimistic,
        ));
        (pool, queue, engine)
    }

    #[tokio::test]
    async fn start_pause_resume_stop_transitions() {
        let (pool, _, _) = make_pool(4, 2, ProcessingDelay::Zero);
        assert_eq!(pool.state(), PoolState::Idle);
        assert!(!pool.pause());
        assert!(pool.start());
        assert!(!pool.start());
        assert_eq!(pool.state(), PoolState::Running);
        assert!(pool.pause());
        assert_eq!(pool.state(), PoolState::Paused);
        assert!(pool.resume());
        assert!(pool.stop().await);
        assert_eq!(pool.state(), PoolState::Idle);
        assert!(!pool.stop().await);
    }

    #[tokio::test]
    async fn running_pool_processes_submissions() {
        let (pool, queue, engine) = make_pool(10, 4, ProcessingDelay::Zero);
        let mut outcomes = engine.notify.subscribe();
        pool.start();

        for seat in ["A1", "A2", "A3"] {
            queue.push(BookingRequest::new("User100", seat)).unwrap();
        }
        for _ in 0..3 {
            let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(outcome.is_success());
        }
        pool.stop().await;
        assert_eq!(engine.stats.succeeded(), 3);
        assert_eq!(engine.inventory.status("A2"), SeatStatus::Booked);
    }

    #[tokio::test]
    async fn paused_pool_leaves_requests_queued() {
        let (pool, queue, engine) = make_pool(10, 2, ProcessingDelay::Zero);
        pool.start();
        pool.pause();
        queue.push(BookingRequest::new("User100", "A1")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(engine.stats.attempted(), 0);

        let mut outcomes = engine.notify.subscribe();
        pool.resume();
        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.request.seat_id, "A1");
        pool.stop().await;
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_bookings() {
        let (pool, queue, engine) =
            make_pool(10, 2, ProcessingDelay::Fixed(Duration::from_millis(100)));
        pool.select_strategy(Strategy::Pessimistic);
        pool.start();
        queue.push(BookingRequest::new("User100", "A1")).unwrap();

        // Wait until the booking holds the seat.
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.inventory.status("A1") != SeatStatus::Processing {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        pool.stop().await;
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(engine.inventory.status("A1"), SeatStatus::Booked);
        assert_eq!(engine.stats.succeeded(), 1);
    }

    #[tokio::test]
    async fn in_flight_counts_running_bookings_while_stopping() {
        let (pool, queue, engine) =
            make_pool(10, 4, ProcessingDelay::Fixed(Duration::from_millis(300)));
        pool.select_strategy(Strategy::Pessimistic);
        pool.start();
        queue.push(BookingRequest::new("User100", "A1")).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.inventory.status("A1") != SeatStatus::Processing {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pool.in_flight(), 1);

        let stopper = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.state(), PoolState::Stopping);
        assert_eq!(pool.in_flight(), 1);

        assert!(stopper.await.unwrap());
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.state(), PoolState::Idle);
    }

    #[tokio::test]
    async fn reset_drops_undispatched_requests() {
        let (pool, queue, engine) =
            make_pool(10, 1, ProcessingDelay::Fixed(Duration::from_millis(100)));
        for seat in ["A1", "A2", "A3"] {
            queue.push(BookingRequest::new("User100", seat)).unwrap();
        }
        let runner = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.process_pending().await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.in_flight() == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        pool.reset();

        let outcomes = runner.await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].request.seat_id, "A1");
        assert!(queue.is_empty());
        assert_eq!(engine.stats.attempted(), 1);
    }

    #[tokio::test]
    async fn process_pending_on_paused_pool_requeues_everything() {
        let (pool, queue, engine) = make_pool(10, 2, ProcessingDelay::Zero);
        pool.start();
        pool.pause();
        queue.push(BookingRequest::new("User100", "A1")).unwrap();
        queue.push(BookingRequest::new("User101", "A2")).unwrap();

        let outcomes = pool.process_pending().await;
        assert!(outcomes.is_empty());
        assert_eq!(queue.len(), 2);
        assert_eq!(engine.stats.attempted(), 0);
        pool.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_worker_count() {
        let (pool, queue, _) =
            make_pool(40, 3, ProcessingDelay::Fixed(Duration::from_millis(20)));
        for i in 0..30 {
            queue.push(BookingRequest::new("User100", seat_id(i))).unwrap();
        }
        let watcher_pool = pool.clone();
        let watcher = tokio::spawn(async move {
            let mut max_seen = 0;
            for _ in 0..100 {
                max_seen = max_seen.max(watcher_pool.in_flight());
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            max_seen
        });
        let outcomes = pool.process_pending().await;
        assert_eq!(outcomes.len(), 30);
        assert!(watcher.await.unwrap() <= 3);
    }

    fn seat_id(i: usize) -> String {
        crate::engine::seat_label(i)
    }
}
