use std::time::Duration;

pub const MAX_SEATS: usize = 10_000;
pub const MAX_WORKERS: usize = 256;
pub const MAX_QUEUE_LEN: usize = 65_536;
/// Applies to both requester and seat identifiers.
pub const MAX_ID_LEN: usize = 64;
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard ceiling on any simulated processing delay, whatever the delay source returns.
pub const MAX_PROCESSING_DELAY: Duration = Duration::from_secs(5);
pub const SEATS_PER_ROW: usize = 10;
