//! Registry and Router Constants

/// Default number of worker threads draining subject queues.
pub const DEFAULT_WORKERS: usize = 4;

/// Default bound of each per-subject measurement queue.
///
/// At 30 Hz vision plus 1 Hz wearable this holds about two seconds of
/// backlog before the oldest raw measurement is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Measurements processed for one subject before yielding the worker.
pub const DEFAULT_DRAIN_BATCH: usize = 16;

/// Inactivity after which a subject is snapshotted and evicted (ms).
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 15 * 60 * 1000;

/// Cadence of idle eviction sweeps (ms).
pub const DEFAULT_EVICTION_INTERVAL_MS: u64 = 30_000;
