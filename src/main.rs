use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use seatlock::{BookingSystem, SystemConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = SystemConfig::from_env();
    seatlock::observability::init(config.metrics_port)?;

    let submit_interval_ms: u64 = std::env::var("SEATLOCK_SUBMIT_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(50);
    let cancel_every: u64 = std::env::var("SEATLOCK_CANCEL_EVERY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let system = BookingSystem::new(config)?;
    info!("seatlock simulation");
    info!("  seats: {}", system.config().seats);
    info!("  workers: {}", system.config().pool.workers);
    info!("  strategy: {}", system.strategy());
    info!("  lock_timeout: {:?}", system.config().engine.lock_timeout);
    info!("  delay: {:?}", system.config().engine.delay);
    info!("  submit_interval: {submit_interval_ms}ms, cancel every {cancel_every} submissions");

    // Booking log
    let mut outcomes = system.subscribe_outcomes();
    tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(outcome) => info!("{outcome}"),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("booking log lagged, {n} outcomes skipped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Live statistics
    let mut reports = system.spawn_reporter();
    tokio::spawn(async move {
        while reports.changed().await.is_ok() {
            let r = reports.borrow_and_update().clone();
            info!(
                "total: {} | success: {} | failed: {} | retries: {} | cancelled: {} | queue: {} | busy: {}",
                r.stats.attempted,
                r.stats.succeeded,
                r.stats.failed,
                r.stats.contended,
                r.stats.cancelled,
                r.queued,
                r.in_flight,
            );
        }
    });

    system.start_processing();

    // Graceful shutdown: stop submitting on SIGTERM/ctrl-c, drain in-flight bookings
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(Duration::from_millis(submit_interval_ms.max(1)));
    let mut submitted: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match system.submit_random() {
                    Ok(request) => {
                        submitted += 1;
                        tracing::debug!("request queued: {request}");
                        if cancel_due(submitted, cancel_every) {
                            system.cancel_random();
                        }
                    }
                    Err(e) => tracing::warn!("submit rejected: {e}"),
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping submissions");
                break;
            }
        }
    }

    system.shutdown().await;

    let report = system.report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("seatlock stopped");
    Ok(())
}

/// A random booking is cancelled after every `cancel_every` accepted submissions.
fn cancel_due(submitted: u64, cancel_every: u64) -> bool {
    cancel_every > 0 && submitted > 0 && submitted % cancel_every == 0
}
