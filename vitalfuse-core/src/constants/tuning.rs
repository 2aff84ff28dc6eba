//! Adaptive Noise Tuner Constants
//!
//! The tuner compares the mean normalized innovation squared (NIS divided
//! by the innovation dimension, expectation 1.0) against its target and
//! rescales process noise within these limits.

/// Capacity of the per-subject NIS window.
pub const NIS_WINDOW_LEN: usize = 64;

/// Samples required before the tuner acts on a window.
///
/// Source: fusion convergence count, ~10 measurements
pub const MIN_NIS_SAMPLES: usize = 10;

/// Tolerance band around the expected normalized NIS of 1.0.
pub const NIS_DEADBAND: f64 = 0.25;

/// Largest multiplicative increase per adjustment.
pub const MAX_SCALE_GROWTH: f64 = 1.5;

/// Smallest multiplicative decrease per adjustment.
pub const MIN_SCALE_SHRINK: f64 = 0.7;

/// Lower bound on the absolute process-noise scale.
pub const MIN_NOISE_SCALE: f64 = 0.1;

/// Upper bound on the absolute process-noise scale.
pub const MAX_NOISE_SCALE: f64 = 10.0;

/// Default cadence of tuning passes (ms).
pub const TUNING_INTERVAL_MS: u64 = 5_000;
