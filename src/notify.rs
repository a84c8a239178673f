use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::BookingOutcome;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for booking outcomes: one feed for everything plus a feed per seat.
pub struct OutcomeHub {
    all: broadcast::Sender<BookingOutcome>,
    seats: DashMap<String, broadcast::Sender<BookingOutcome>>,
}

impl Default for OutcomeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeHub {
    pub fn new() -> Self {
        Self {
            all: broadcast::channel(CHANNEL_CAPACITY).0,
            seats: DashMap::new(),
        }
    }

    /// Every outcome, in completion order. Slow receivers see `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<BookingOutcome> {
        self.all.subscribe()
    }

    /// Outcomes for one seat. Creates the channel if needed, dropping channels
    /// whose receivers are all gone first.
    pub fn subscribe_seat(&self, seat_id: &str) -> broadcast::Receiver<BookingOutcome> {
        self.prune();
        let sender = self
            .seats
            .entry(seat_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an outcome. No-op if nobody is listening.
    pub fn send(&self, outcome: &BookingOutcome) {
        let _ = self.all.send(outcome.clone());
        if let Some(sender) = self.seats.get(&outcome.request.seat_id) {
            let _ = sender.send(outcome.clone());
        }
    }

    /// Drop per-seat channels nobody listens to any more.
    pub fn prune(&self) {
        self.seats.retain(|_, sender| sender.receiver_count() > 0);
    }
}
