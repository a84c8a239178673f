use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::limits::SEATS_PER_ROW;
use crate::model::{FailureReason, SeatSnapshot, SeatStatus};
use crate::stats::Statistics;

use super::delay::ProcessingDelay;

pub type SharedSeat = Arc<Seat>;

#[derive(Debug, Clone, Copy)]
struct SeatCell {
    status: SeatStatus,
    version: u64,
}

impl SeatCell {
    const INITIAL: SeatCell = SeatCell {
        status: SeatStatus::Available,
        version: 0,
    };
}

/// One bookable seat. Fields are private: every transition goes through [`Inventory`].
#[derive(Debug)]
pub struct Seat {
    id: String,
    /// Creation order, used for stable listing.
    index: usize,
    /// Status and version. Never held across an await.
    cell: Mutex<SeatCell>,
    /// Exclusive-access token for the pessimistic path. Held across the booking work.
    token: tokio::sync::Mutex<()>,
}

impl Seat {
    fn new(id: String, index: usize) -> Self {
        Self {
            id,
            index,
            cell: Mutex::new(SeatCell::INITIAL),
            token: tokio::sync::Mutex::new(()),
        }
    }

    fn snapshot(&self) -> SeatSnapshot {
        let cell = *self.cell.lock();
        SeatSnapshot {
            id: self.id.clone(),
            status: cell.status,
            version: cell.version,
        }
    }

    /// Available → Processing. Caller must hold the token.
    fn reserve(&self) -> Result<Reservation<'_>, FailureReason> {
        let mut cell = self.cell.lock();
        if cell.status != SeatStatus::Available {
            return Err(FailureReason::Unavailable);
        }
        cell.status = SeatStatus::Processing;
        Ok(Reservation {
            seat: self,
            committed: false,
        })
    }
}

/// A seat parked in Processing. Dropping it uncommitted puts the seat back to
/// Available, so an abandoned booking never leaves the seat stuck.
struct Reservation<'a> {
    seat: &'a Seat,
    committed: bool,
}

impl Reservation<'_> {
    /// Processing → Booked.
    ///
    /// Unconditional: a `cancel` or `reset_all` that ran while the work was in
    /// progress is overwritten here (lost update, see [`Inventory::cancel`]).
    fn commit(mut self) {
        self.seat.cell.lock().status = SeatStatus::Booked;
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut cell = self.seat.cell.lock();
        if cell.status == SeatStatus::Processing {
            cell.status = SeatStatus::Available;
        }
    }
}

/// Row-major grid label: `A1`..`A10`, `B1`.., rows past `Z` continue `AA`, `AB`, ...
pub fn seat_label(index: usize) -> String {
    let mut row = index / SEATS_PER_ROW;
    let col = index % SEATS_PER_ROW + 1;
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (row % 26) as u8);
        if row < 26 {
            break;
        }
        row = row / 26 - 1;
    }
    letters.reverse();
    let mut label: String = letters.into_iter().map(char::from).collect();
    label.push_str(&col.to_string());
    label
}

/// Sole owner of all seat state.
pub struct Inventory {
    seats: DashMap<String, SharedSeat>,
    stats: Arc<Statistics>,
}

impl Inventory {
    pub fn new(count: usize, stats: Arc<Statistics>) -> Self {
        let inventory = Self {
            seats: DashMap::with_capacity(count),
            stats,
        };
        inventory.initialize(count);
        inventory
    }

    /// Replace the seat set with `count` fresh seats, all Available at version 0.
    pub fn initialize(&self, count: usize) {
        self.seats.clear();
        for index in 0..count {
            let id = seat_label(index);
            self.seats.insert(id.clone(), Arc::new(Seat::new(id, index)));
        }
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seats.contains_key(id)
    }

    fn get(&self, id: &str) -> Option<SharedSeat> {
        self.seats.get(id).map(|e| e.value().clone())
    }

    /// Unknown ids read as Available.
    pub fn status(&self, id: &str) -> SeatStatus {
        match self.get(id) {
            Some(seat) => seat.cell.lock().status,
            None => SeatStatus::Available,
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<SeatSnapshot> {
        self.get(id).map(|seat| seat.snapshot())
    }

    /// Every seat in creation order.
    pub fn list(&self) -> Vec<SeatSnapshot> {
        let mut seats: Vec<SharedSeat> = self.seats.iter().map(|e| e.value().clone()).collect();
        seats.sort_by_key(|s| s.index);
        seats.iter().map(|s| s.snapshot()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.list().into_iter().map(|s| s.id).collect()
    }

    pub fn booked_ids(&self) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|s| s.status == SeatStatus::Booked)
            .map(|s| s.id)
            .collect()
    }

    // ── Transitions ──────────────────────────────────────────

    /// Compare-and-swap: Available at `expected_version` → Booked at `expected_version + 1`.
    pub fn try_optimistic_book(
        &self,
        id: &str,
        expected_version: u64,
    ) -> Result<(), FailureReason> {
        let seat = self.get(id).ok_or(FailureReason::UnknownSeat)?;
        let mut cell = seat.cell.lock();
        if cell.status != SeatStatus::Available || cell.version != expected_version {
            return Err(FailureReason::Conflict);
        }
        cell.status = SeatStatus::Booked;
        cell.version += 1;
        Ok(())
    }

    /// Take the seat's token within `timeout`, then Available → Processing →
    /// (work) → Booked. The token is released on every exit path, and a booking
    /// abandoned mid-work returns the seat to Available.
    pub async fn try_pessimistic_book(
        &self,
        id: &str,
        timeout: Duration,
        work: &ProcessingDelay,
    ) -> Result<(), FailureReason> {
        let seat = self.get(id).ok_or(FailureReason::UnknownSeat)?;

        let wait_start = Instant::now();
        let _token = tokio::time::timeout(timeout, seat.token.lock())
            .await
            .map_err(|_| FailureReason::Contended)?;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());

        let reservation = seat.reserve()?;
        work.wait().await;
        reservation.commit();
        Ok(())
    }

    /// Force the seat back to Available and count a cancellation. Returns false
    /// (and counts nothing) for an unknown id.
    ///
    /// There is no version or ownership check. A cancel that lands while a
    /// pessimistic booking holds the seat in Processing is overwritten when that
    /// booking commits, so the cancellation is lost. This is an administrative
    /// override, kept unguarded on purpose.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(seat) = self.get(id) else {
            return false;
        };
        seat.cell.lock().status = SeatStatus::Available;
        self.stats.record_cancel();
        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
        true
    }

    /// Cancel one booked seat chosen uniformly at random.
    pub fn cancel_random(&self) -> Option<String> {
        let booked = self.booked_ids();
        let id = booked.choose(&mut rand::thread_rng())?.clone();
        self.cancel(&id);
        Some(id)
    }

    /// Every seat back to Available at version 0.
    pub fn reset_all(&self) {
        for entry in self.seats.iter() {
            *entry.value().cell.lock() = SeatCell::INITIAL;
        }
    }
}
