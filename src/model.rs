use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

/// Lifecycle of a single seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatStatus {
    Available,
    /// Held under the seat's exclusive token while a pessimistic booking does its work.
    Processing,
    Booked,
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatStatus::Available => f.write_str("available"),
            SeatStatus::Processing => f.write_str("processing"),
            SeatStatus::Booked => f.write_str("booked"),
        }
    }
}

/// Point-in-time copy of a seat's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    pub id: String,
    pub status: SeatStatus,
    pub version: u64,
}

/// Concurrency-control strategy used to arbitrate a booking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Snapshot the version, do the work, then compare-and-swap.
    #[default]
    Optimistic,
    /// Take the seat's exclusive token (bounded wait), then do the work.
    Pessimistic,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Optimistic => "optimistic",
            Strategy::Pessimistic => "pessimistic",
        }
    }

    /// Parse a strategy name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimistic" | "occ" => Some(Strategy::Optimistic),
            "pessimistic" | "lock" => Some(Strategy::Pessimistic),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A request to book one seat. Immutable once created; consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Ulid,
    pub requester: String,
    pub seat_id: String,
    pub created_at: Ms,
}

impl BookingRequest {
    pub fn new(requester: impl Into<String>, seat_id: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            requester: requester.into(),
            seat_id: seat_id.into(),
            created_at: now_ms(),
        }
    }
}

impl fmt::Display for BookingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.requester, self.seat_id)
    }
}

/// Why a booking attempt did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// Optimistic commit found a different version or a non-available seat.
    Conflict,
    /// Pessimistic lock was not acquired within the timeout.
    Contended,
    /// The seat was already taken when the attempt looked at it.
    Unavailable,
    /// No seat with the requested id exists.
    UnknownSeat,
}

impl FailureReason {
    /// Conflicts and lock timeouts count towards the retry/contention counter.
    pub fn is_contention(&self) -> bool {
        matches!(self, FailureReason::Conflict | FailureReason::Contended)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::Conflict => "conflict",
            FailureReason::Contended => "contended",
            FailureReason::Unavailable => "unavailable",
            FailureReason::UnknownSeat => "unknown_seat",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Conflict => f.write_str("version conflict at commit"),
            FailureReason::Contended => f.write_str("lock not acquired within timeout"),
            FailureReason::Unavailable => f.write_str("seat not available"),
            FailureReason::UnknownSeat => f.write_str("unknown seat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure(FailureReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure(reason) => reason.label(),
        }
    }
}

impl From<Result<(), FailureReason>> for Outcome {
    fn from(result: Result<(), FailureReason>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(reason) => Outcome::Failure(reason),
        }
    }
}

/// Result of processing one request, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingOutcome {
    pub request: BookingRequest,
    pub strategy: Strategy,
    pub outcome: Outcome,
    pub completed_at: Ms,
}

impl BookingOutcome {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

impl fmt::Display for BookingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Success => write!(f, "{} booked ({})", self.request, self.strategy),
            Outcome::Failure(reason) => {
                write!(f, "{} failed ({}): {reason}", self.request, self.strategy)
            }
        }
    }
}

/// Counter values read one at a time; not a consistent joint snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub contended: u64,
    pub cancelled: u64,
}
