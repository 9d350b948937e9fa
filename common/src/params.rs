//! Chain-wide constants

/// Consecutive blocks produced by one producer before rotation.
pub const PRODUCER_REPETITIONS: u32 = 12;

/// Upper bound on the size of a producer schedule.
pub const MAX_PRODUCERS: usize = 125;

/// Maximum number of pending heights tracked in a header's confirm count.
pub const MAX_TRACKED_DPOS_CONFIRMATIONS: usize = 1024;

pub const BLOCK_INTERVAL_MS: i64 = 500;

/// 2000-01-01T00:00:00Z
pub const BLOCK_TIMESTAMP_EPOCH_MS: i64 = 946_684_800_000;

// Confirm counters are 8 bits wide
const _: () = assert!(MAX_PRODUCERS * 2 / 3 + 1 <= u8::MAX as usize);
