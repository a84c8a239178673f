use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts processed. Labels: strategy, outcome.
pub const BOOKINGS_TOTAL: &str = "seatlock_bookings_total";

/// Histogram: booking attempt latency in seconds, including simulated work. Labels: strategy.
pub const BOOKING_DURATION_SECONDS: &str = "seatlock_booking_duration_seconds";

/// Histogram: time spent acquiring a seat token on the pessimistic path (successful acquisitions).
pub const LOCK_WAIT_SECONDS: &str = "seatlock_lock_wait_seconds";

/// Counter: cancellations applied.
pub const CANCELLATIONS_TOTAL: &str = "seatlock_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: requests waiting in the queue.
pub const QUEUE_DEPTH: &str = "seatlock_queue_depth";

/// Gauge: bookings currently running in the worker pool.
pub const WORKERS_BUSY: &str = "seatlock_workers_busy";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), EngineError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            tracing::error!("failed to install Prometheus metrics exporter: {e}");
            EngineError::InvalidConfig("metrics exporter could not be installed")
        })?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
