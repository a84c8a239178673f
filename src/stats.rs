use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::model::{FailureReason, StatsSnapshot};

/// Outcome counters shared by every worker.
///
/// Each counter is atomic on its own. Nothing ties them together, so a
/// [`snapshot`](Statistics::snapshot) taken while workers are running may see
/// `attempted` ahead of `succeeded + failed`. Readers that need agreement should
/// snapshot once the pool is idle.
///
/// A [`reset`](Statistics::reset) starts a new generation. Results of attempts
/// counted in an earlier generation are discarded, so `succeeded + failed` never
/// runs ahead of `attempted`.
#[derive(Debug, Default)]
pub struct Statistics {
    /// Held shared while recording, exclusively while resetting.
    generation: RwLock<u64>,
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    contended: AtomicU64,
    cancelled: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an attempt. Returns the generation its result must be recorded in.
    pub fn record_attempt(&self) -> u64 {
        let generation = self.generation.read();
        self.attempted.fetch_add(1, Ordering::Relaxed);
        *generation
    }

    /// Count the result of an attempt from `generation`. Returns false, counting
    /// nothing, if the counters were reset since the attempt was counted.
    pub fn record_result(&self, generation: u64, result: Result<(), FailureReason>) -> bool {
        let current = self.generation.read();
        if *current != generation {
            return false;
        }
        match result {
            Ok(()) => self.record_success(),
            Err(reason) => self.record_failure(reason),
        }
        true
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, reason: FailureReason) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if reason.is_contention() {
            self.contended.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempted: self.attempted(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            contended: self.contended(),
            cancelled: self.cancelled(),
        }
    }

    pub fn reset(&self) {
        let mut generation = self.generation.write();
        *generation += 1;
        for counter in [
            &self.attempted,
            &self.succeeded,
            &self.failed,
            &self.contended,
            &self.cancelled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
