use std::time::Duration;

use tokio::sync::broadcast;

use seatlock::engine::seat_label;
use seatlock::{
    BookingOutcome, BookingSystem, EngineError, FailureReason, Outcome, PoolState, ProcessingDelay,
    SeatStatus, StatsSnapshot, Strategy, SystemConfig,
};

// ── Test infrastructure ──────────────────────────────────────

fn system_with(
    seats: usize,
    strategy: Strategy,
    lock_timeout_ms: u64,
    delay: ProcessingDelay,
) -> BookingSystem {
    let mut config = SystemConfig {
        seats,
        strategy,
        ..SystemConfig::default()
    };
    config.engine.lock_timeout = Duration::from_millis(lock_timeout_ms);
    config.engine.delay = delay;
    config.pool.poll_interval = Duration::from_millis(10);
    config.pool.drain_timeout = Duration::from_secs(5);
    config.report_interval = Duration::from_millis(10);
    BookingSystem::new(config).unwrap()
}

async fn next_outcome(rx: &mut broadcast::Receiver<BookingOutcome>) -> BookingOutcome {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for outcome")
        .expect("outcome channel closed")
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_optimistic_requests_one_seat_one_winner() {
    let delay = ProcessingDelay::Fixed(Duration::from_millis(20));
    let system = system_with(2, Strategy::Optimistic, 100, delay);
    for user in ["User101", "User102", "User103"] {
        system.submit_request(user, "A1").unwrap();
    }

    let outcomes = system.process_pending().await;
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 1);

    let stats = system.snapshot_statistics();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(system.status("A1"), SeatStatus::Booked);
    assert_eq!(system.status("A2"), SeatStatus::Available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_simultaneous_pessimistic_requests_book_at_most_once() {
    let system = system_with(4, Strategy::Pessimistic, 100, ProcessingDelay::Uniform {
        min: Duration::from_millis(30),
        max: Duration::from_millis(80),
    });
    system.submit_request("User101", "B2").unwrap();
    system.submit_request("User102", "B2").unwrap();

    let outcomes = system.process_pending().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().filter(|o| o.is_success()).count() <= 1);
    for outcome in outcomes.iter().filter(|o| !o.is_success()) {
        assert!(matches!(
            outcome.outcome,
            Outcome::Failure(FailureReason::Contended | FailureReason::Unavailable)
        ));
    }
    assert_eq!(system.status("B2"), SeatStatus::Booked);
}

#[tokio::test]
async fn reset_restores_every_seat() {
    let system = system_with(12, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    for seat in ["A1", "A5", "B2"] {
        system.submit_request("User100", seat).unwrap();
    }
    system.process_pending().await;
    system.cancel("A5");
    system.submit_request("User100", "A5").unwrap();
    system.process_pending().await;
    system.submit_request("User100", "C1").unwrap();

    system.reset_system();

    let seats = system.list_all_seats();
    assert_eq!(seats.len(), 12);
    assert!(seats.iter().all(|s| s.status == SeatStatus::Available && s.version == 0));
    assert_eq!(system.snapshot_statistics(), StatsSnapshot::default());
    assert_eq!(system.queue_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reset_drops_backlog_held_by_running_pool() {
    let mut config = SystemConfig {
        seats: 20,
        ..SystemConfig::default()
    };
    config.engine.delay = ProcessingDelay::Fixed(Duration::from_millis(50));
    config.pool.workers = 2;
    config.pool.poll_interval = Duration::from_millis(10);
    let system = BookingSystem::new(config).unwrap();

    for i in 0..20 {
        system.submit_request("User100", &seat_label(i)).unwrap();
    }
    system.start_processing();

    // Both workers busy: the dispatcher has drained the queue and holds the rest.
    tokio::time::timeout(Duration::from_secs(5), async {
        while system.in_flight() < 2 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(system.queue_len(), 0);

    system.reset_system();
    tokio::time::sleep(Duration::from_millis(800)).await;

    let booked = system
        .list_all_seats()
        .iter()
        .filter(|s| s.status == SeatStatus::Booked)
        .count();
    assert!(booked <= 2, "only bookings running at reset may land, got {booked}");
    let stats = system.snapshot_statistics();
    assert!(stats.attempted <= 2);
    assert!(stats.succeeded + stats.failed <= stats.attempted);
    assert_eq!(system.queue_len(), 0);

    system.shutdown().await;
}

#[tokio::test]
async fn processing_empty_queue_changes_nothing() {
    let system = system_with(4, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    let before = system.list_all_seats();

    let outcomes = system.process_pending().await;

    assert!(outcomes.is_empty());
    assert_eq!(system.list_all_seats(), before);
    assert_eq!(system.snapshot_statistics(), StatsSnapshot::default());
}

// ── Lifecycle ────────────────────────────────────────────────

#[tokio::test]
async fn running_system_reports_outcomes_in_order_per_seat() {
    let system = system_with(10, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    let mut seat_feed = system.subscribe_seat("C3");
    assert!(system.start_processing());
    assert_eq!(system.pool_state(), PoolState::Running);

    let first = system.submit_request("User100", "C3").unwrap();
    let first_outcome = next_outcome(&mut seat_feed).await;
    assert_eq!(first_outcome.request.id, first.id);
    assert!(first_outcome.is_success());

    let second = system.submit_request("User200", "C3").unwrap();
    let second_outcome = next_outcome(&mut seat_feed).await;
    assert_eq!(second_outcome.request.id, second.id);
    assert_eq!(second_outcome.outcome, Outcome::Failure(FailureReason::Unavailable));

    assert!(system.stop_processing().await);
    assert_eq!(system.pool_state(), PoolState::Idle);
}

#[tokio::test]
async fn strategy_switch_applies_to_later_requests() {
    let system = system_with(10, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    let mut outcomes = system.subscribe_outcomes();
    system.start_processing();

    system.submit_request("User100", "A1").unwrap();
    assert_eq!(next_outcome(&mut outcomes).await.strategy, Strategy::Optimistic);

    system.select_strategy(Strategy::Pessimistic);
    assert_eq!(system.strategy(), Strategy::Pessimistic);
    system.submit_request("User100", "A2").unwrap();
    assert_eq!(next_outcome(&mut outcomes).await.strategy, Strategy::Pessimistic);

    system.shutdown().await;
}

#[tokio::test]
async fn stop_keeps_undispatched_requests_queued() {
    let system = system_with(10, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    system.start_processing();
    system.pause();
    system.submit_request("User100", "A1").unwrap();
    system.submit_request("User100", "A2").unwrap();
    system.stop_processing().await;

    assert_eq!(system.queue_len(), 2);
    assert_eq!(system.snapshot_statistics().attempted, 0);

    // A later run picks them up.
    let outcomes = system.process_pending().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_success()));
}

#[tokio::test]
async fn cancel_and_cancel_random() {
    let system = system_with(4, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    assert_eq!(system.cancel_random(), None);

    system.submit_request("User100", "A3").unwrap();
    system.process_pending().await;
    assert_eq!(system.status("A3"), SeatStatus::Booked);

    assert_eq!(system.cancel_random().as_deref(), Some("A3"));
    assert_eq!(system.status("A3"), SeatStatus::Available);
    assert!(system.cancel("A3"));
    assert!(!system.cancel("nope"));
    assert_eq!(system.snapshot_statistics().cancelled, 2);
}

#[tokio::test]
async fn unknown_seat_is_accepted_and_fails_softly() {
    let system = system_with(4, Strategy::Pessimistic, 100, ProcessingDelay::Zero);
    system.submit_request("User100", "Z42").unwrap();
    let outcomes = system.process_pending().await;
    assert_eq!(outcomes[0].outcome, Outcome::Failure(FailureReason::UnknownSeat));
    assert_eq!(system.status("Z42"), SeatStatus::Available);
    assert!(system.seat("Z42").is_none());
}

#[tokio::test]
async fn submit_validates_ids() {
    let system = system_with(4, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    assert_eq!(
        system.submit_request("", "A1").unwrap_err(),
        EngineError::InvalidId("empty requester id")
    );
    assert_eq!(
        system.submit_request("User100", " ").unwrap_err(),
        EngineError::InvalidId("empty seat id")
    );
    let long = "x".repeat(seatlock::limits::MAX_ID_LEN + 1);
    assert!(matches!(
        system.submit_request(&long, "A1"),
        Err(EngineError::LimitExceeded(_))
    ));
    assert_eq!(system.queue_len(), 0);
}

#[tokio::test]
async fn submit_random_targets_existing_seats() {
    let system = system_with(15, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    for _ in 0..50 {
        let request = system.submit_random().unwrap();
        assert!(system.seat(&request.seat_id).is_some());
        assert!(request.requester.starts_with("User"));
    }
    assert_eq!(system.queue_len(), 50);
}

#[tokio::test]
async fn reporter_tracks_live_counters() {
    let system = system_with(4, Strategy::Optimistic, 100, ProcessingDelay::Zero);
    let mut reports = system.spawn_reporter();

    system.submit_request("User100", "A1").unwrap();
    system.process_pending().await;

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            reports.changed().await.unwrap();
            if reports.borrow_and_update().stats.succeeded == 1 {
                break;
            }
        }
    })
    .await
    .unwrap();

    system.shutdown().await;
}

#[test]
fn invalid_config_is_rejected() {
    let config = SystemConfig {
        seats: 0,
        ..SystemConfig::default()
    };
    assert!(matches!(
        BookingSystem::new(config),
        Err(EngineError::InvalidConfig(_))
    ));
}
