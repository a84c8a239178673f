use std::str::FromStr;
use std::time::Duration;

use crate::engine::{EngineConfig, EngineError, ProcessingDelay};
use crate::limits::*;
use crate::model::Strategy;
use crate::pool::PoolConfig;

/// Everything needed to build a [`crate::BookingSystem`].
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub seats: usize,
    pub strategy: Strategy,
    pub engine: EngineConfig,
    pub pool: PoolConfig,
    pub report_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            seats: 100,
            strategy: Strategy::Optimistic,
            engine: EngineConfig::default(),
            pool: PoolConfig::default(),
            report_interval: Duration::from_secs(1),
            metrics_port: None,
        }
    }
}

impl SystemConfig {
    /// Read `SEATLOCK_*` environment variables. Unset or unparsable values fall
    /// back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let seats = parse("SEATLOCK_SEATS")
            .map(|n| n as usize)
            .unwrap_or(defaults.seats);
        let strategy = lookup("SEATLOCK_STRATEGY")
            .and_then(|s| Strategy::parse(&s))
            .unwrap_or(defaults.strategy);

        let lock_timeout = parse("SEATLOCK_LOCK_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.engine.lock_timeout);
        let delay = match (parse("SEATLOCK_DELAY_MIN_MS"), parse("SEATLOCK_DELAY_MAX_MS")) {
            (None, None) => defaults.engine.delay,
            (min, max) => delay_from_bounds(min.unwrap_or(0), max.unwrap_or(0)),
        };

        let workers = parse("SEATLOCK_WORKERS")
            .map(|n| n as usize)
            .unwrap_or(defaults.pool.workers);
        let poll_interval = parse("SEATLOCK_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.pool.poll_interval);
        let drain_timeout = parse("SEATLOCK_DRAIN_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.pool.drain_timeout);

        let report_interval = parse("SEATLOCK_REPORT_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.report_interval);
        let metrics_port =
            lookup("SEATLOCK_METRICS_PORT").and_then(|s| u16::from_str(s.trim()).ok());

        Self {
            seats,
            strategy,
            engine: EngineConfig { lock_timeout, delay },
            pool: PoolConfig {
                workers,
                poll_interval,
                drain_timeout,
            },
            report_interval,
            metrics_port,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.seats == 0 {
            return Err(EngineError::InvalidConfig("seat count must be positive"));
        }
        if self.seats > MAX_SEATS {
            return Err(EngineError::LimitExceeded("too many seats"));
        }
        if self.pool.workers == 0 {
            return Err(EngineError::InvalidConfig("worker count must be positive"));
        }
        if self.pool.workers > MAX_WORKERS {
            return Err(EngineError::LimitExceeded("too many workers"));
        }
        if self.engine.lock_timeout > MAX_LOCK_TIMEOUT {
            return Err(EngineError::LimitExceeded("lock timeout too long"));
        }
        if self.pool.poll_interval.is_zero() {
            return Err(EngineError::InvalidConfig("poll interval must be positive"));
        }
        if self.report_interval.is_zero() {
            return Err(EngineError::InvalidConfig("report interval must be positive"));
        }
        Ok(())
    }
}

fn delay_from_bounds(min_ms: u64, max_ms: u64) -> ProcessingDelay {
    let min = Duration::from_millis(min_ms);
    let max = Duration::from_millis(max_ms);
    if min.is_zero() && max.is_zero() {
        ProcessingDelay::Zero
    } else if max <= min {
        ProcessingDelay::Fixed(min)
    } else {
        ProcessingDelay::Uniform { min, max }
    }
}
