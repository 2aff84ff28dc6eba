//! Time-Related Constants
//!
//! Conversion factors between the millisecond timestamps carried by
//! measurements and the per-second rates used by the process model.

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Seconds per minute.
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Milliseconds per minute.
pub const MS_PER_MINUTE: u64 = MS_PER_SECOND * SECONDS_PER_MINUTE;

/// Seconds per minute as a float, for projections expressed in minutes.
pub const SECONDS_PER_MINUTE_F64: f64 = 60.0;
