//! In-process seat booking engine with two interchangeable concurrency-control
//! strategies: optimistic (version compare-and-swap) and pessimistic (per-seat
//! token with a bounded wait).

pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod pool;
pub mod queue;
pub mod reporter;
pub mod stats;
pub mod system;

pub use config::SystemConfig;
pub use engine::{Engine, EngineConfig, EngineError, Inventory, ProcessingDelay};
pub use model::{
    BookingOutcome, BookingRequest, FailureReason, Outcome, SeatSnapshot, SeatStatus, StatsSnapshot,
    Strategy,
};
pub use pool::{PoolConfig, PoolState, WorkerPool};
pub use system::BookingSystem;
